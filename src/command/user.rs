//! User commands: creation, profile, email, phone, password, state.

use crate::aggregate::user::{
    CodeAddedPayload, EmailChangedPayload, HumanAddedPayload, HumanProfile, MachineAddedPayload,
    PasswordChangedPayload, PhoneChangedPayload, ProfileChangedPayload, UserState,
    UsernameChangedPayload, EMAIL_CHANGED, EMAIL_CHECK_FAILED, EMAIL_CODE_ADDED, EMAIL_VERIFIED,
    HUMAN_ADDED, MACHINE_ADDED, PASSWORD_CHANGED, PASSWORD_CHECK_FAILED, PASSWORD_CHECK_SUCCEEDED,
    PHONE_CHANGED, PHONE_CHECK_FAILED, PHONE_CODE_ADDED, PHONE_REMOVED, PHONE_VERIFIED,
    PROFILE_CHANGED, USERNAME_CHANGED, USER_DEACTIVATED, USER_LOCKED, USER_REACTIVATED,
    USER_REMOVED, USER_UNLOCKED,
};
use crate::aggregate::{Aggregate, User};
use crate::domain::validation::{
    normalize_email, require_max_len, require_non_empty, validate_email,
};
use crate::domain::VerificationCode;
use crate::error::{AppResult, Error};
use crate::event_store::{EventCommand, UniqueConstraint};

use super::{CommandContext, Commands};

const UNIQUE_USERNAMES: &str = "usernames";

fn username_field(org_id: &str, username: &str) -> String {
    format!("{org_id}:{username}")
}

#[derive(Debug, Clone)]
pub struct AddHumanUserRequest {
    pub org_id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: Option<String>,
    pub preferred_language: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddMachineUserRequest {
    pub org_id: String,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
}

impl Commands {
    /// Create a human user. Without an initial password the user starts in
    /// state Initial.
    pub async fn add_human_user(
        &self,
        ctx: &CommandContext,
        request: AddHumanUserRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let username = request.username.trim().to_string();
        require_non_empty(&username, "USER-HUMAN-001", "username")?;
        require_max_len(&username, 200, "USER-HUMAN-001", "username")?;
        require_non_empty(&request.first_name, "USER-HUMAN-002", "first name")?;
        require_non_empty(&request.last_name, "USER-HUMAN-002", "last name")?;

        let email = normalize_email(&request.email);
        validate_email(&email)?;

        let phone = match &request.phone {
            Some(raw) => Some(
                self.phones()
                    .normalize(raw, &self.settings().default_phone_region)?,
            ),
            None => None,
        };

        let password_hash = match &request.password {
            Some(password) => {
                if password.len() > 72 {
                    return Err(Error::invalid_argument(
                        "PASSWORD-003",
                        "password must be at most 72 bytes",
                    ));
                }
                self.effective_password_complexity(ctx, Some(&request.org_id))
                    .await?
                    .check(password)?;
                Some(self.hasher().hash(password)?)
            }
            None => None,
        };

        self.existing_org(ctx, &request.org_id).await?;

        let user_id = self.next_id();
        let added = EventCommand::new(User::aggregate_type(), &user_id, HUMAN_ADDED)
            .payload(&HumanAddedPayload {
                username: username.clone(),
                profile: HumanProfile {
                    first_name: request.first_name.clone(),
                    last_name: request.last_name.clone(),
                    display_name: request.display_name.clone(),
                    preferred_language: request.preferred_language.clone(),
                },
                email: email.clone(),
                phone,
                password_hash,
            })?
            .editor(&ctx.editor_user)
            .owner(&request.org_id)
            .expected_version(0)
            .unique_constraint(UniqueConstraint::add(
                UNIQUE_USERNAMES,
                &username_field(&request.org_id, &username),
                "USER-004",
                format!("username already taken: {username}"),
            ));

        let code = self.codes().otp6();
        let code_event = EventCommand::new(User::aggregate_type(), &user_id, EMAIL_CODE_ADDED)
            .payload(&CodeAddedPayload {
                code: VerificationCode::issue(&code, self.settings().code_lifetime, self.now()),
            })?
            .editor(&ctx.editor_user)
            .owner(&request.org_id);

        self.push(ctx, vec![added, code_event]).await?;
        self.notifier()
            .send_email(&email, "Verify your email", &format!("Your code: {code}"))
            .await;

        Ok(user_id)
    }

    /// Create a machine user (service account).
    pub async fn add_machine_user(
        &self,
        ctx: &CommandContext,
        request: AddMachineUserRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let username = request.username.trim().to_string();
        require_non_empty(&username, "USER-MACHINE-001", "username")?;
        require_max_len(&username, 200, "USER-MACHINE-001", "username")?;
        require_non_empty(&request.name, "USER-MACHINE-002", "machine name")?;

        self.existing_org(ctx, &request.org_id).await?;

        let user_id = self.next_id();
        let command = EventCommand::new(User::aggregate_type(), &user_id, MACHINE_ADDED)
            .payload(&MachineAddedPayload {
                username: username.clone(),
                name: request.name.clone(),
                description: request.description.clone(),
            })?
            .editor(&ctx.editor_user)
            .owner(&request.org_id)
            .expected_version(0)
            .unique_constraint(UniqueConstraint::add(
                UNIQUE_USERNAMES,
                &username_field(&request.org_id, &username),
                "USER-004",
                format!("username already taken: {username}"),
            ));

        self.push(ctx, vec![command]).await?;
        Ok(user_id)
    }

    pub async fn change_username(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        username: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let username = username.trim().to_string();
        require_non_empty(&username, "USER-HUMAN-001", "username")?;
        require_max_len(&username, 200, "USER-HUMAN-001", "username")?;

        self.retrying(|| {
            let username = username.clone();
            Box::pin(async move {
                let user = self.existing_user(ctx, user_id).await?;
                if user.username == username {
                    return Ok(());
                }
                let org_id = user.stream().resource_owner.clone();
                let command = EventCommand::new(User::aggregate_type(), user_id, USERNAME_CHANGED)
                    .payload(&UsernameChangedPayload {
                        username: username.clone(),
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&org_id)
                    .expected_version(user.version())
                    .unique_constraint(UniqueConstraint::remove(
                        UNIQUE_USERNAMES,
                        &username_field(&org_id, &user.username),
                    ))
                    .unique_constraint(UniqueConstraint::add(
                        UNIQUE_USERNAMES,
                        &username_field(&org_id, &username),
                        "USER-004",
                        format!("username already taken: {username}"),
                    ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Update profile fields; providing only current values is a no-op.
    pub async fn change_profile(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        changes: ProfileChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let user = self.existing_human(ctx, user_id).await?;
                let profile = &user.human().expect("checked human").profile;

                let mut effective = changes;
                if effective.first_name.as_deref() == Some(profile.first_name.as_str()) {
                    effective.first_name = None;
                }
                if effective.last_name.as_deref() == Some(profile.last_name.as_str()) {
                    effective.last_name = None;
                }
                if effective.display_name == profile.display_name {
                    effective.display_name = None;
                }
                if effective.preferred_language == profile.preferred_language {
                    effective.preferred_language = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command = EventCommand::new(User::aggregate_type(), user_id, PROFILE_CHANGED)
                    .payload(&effective)?
                    .editor(&ctx.editor_user)
                    .owner(&user.stream().resource_owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Change the email address. Unverified changes emit a verification
    /// code event and notify the new address.
    pub async fn change_email(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        email: &str,
        is_verified: bool,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let email = normalize_email(email);
        validate_email(&email)?;

        let outcome = self
            .retrying(|| {
                let email = email.clone();
                Box::pin(async move {
                    let user = self.existing_human(ctx, user_id).await?;
                    let human = user.human().expect("checked human");
                    let owner = user.stream().resource_owner.clone();

                    if human.email == email && human.email_verified == is_verified {
                        return Ok(None);
                    }

                    let mut commands = Vec::new();
                    if human.email != email {
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, EMAIL_CHANGED)
                                .payload(&EmailChangedPayload {
                                    email: email.clone(),
                                })?
                                .editor(&ctx.editor_user)
                                .owner(&owner)
                                .expected_version(user.version()),
                        );
                    }

                    let mut code = None;
                    if is_verified {
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, EMAIL_VERIFIED)
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                    } else {
                        let plain = self.codes().otp6();
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, EMAIL_CODE_ADDED)
                                .payload(&CodeAddedPayload {
                                    code: VerificationCode::issue(
                                        &plain,
                                        self.settings().code_lifetime,
                                        self.now(),
                                    ),
                                })?
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                        code = Some(plain);
                    }

                    if let Some(first) = commands.first_mut() {
                        first.expected_version = Some(user.version());
                    }
                    self.push(ctx, commands).await?;
                    Ok(code)
                })
            })
            .await?;

        if let Some(code) = outcome {
            self.notifier()
                .send_email(&email, "Verify your email", &format!("Your code: {code}"))
                .await;
        }
        Ok(())
    }

    /// Compare a submitted email code; wrong codes are recorded as a
    /// `check.failed` event and still error.
    pub async fn verify_email(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if human.email_verified {
            return Ok(());
        }
        let pending = human.pending_email_code.clone().ok_or_else(|| {
            Error::failed_precondition("CODE-005", "no email verification pending")
        })?;
        let owner = user.stream().resource_owner.clone();

        match pending.verify(code, self.now()) {
            Ok(()) => {
                let command = EventCommand::new(User::aggregate_type(), user_id, EMAIL_VERIFIED)
                    .editor(&ctx.editor_user)
                    .owner(&owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            }
            Err(err) if err.code == "CODE-002" => {
                let command = EventCommand::new(User::aggregate_type(), user_id, EMAIL_CHECK_FAILED)
                    .editor(&ctx.editor_user)
                    .owner(&owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn change_phone(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        phone: &str,
        is_verified: bool,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let phone = self
            .phones()
            .normalize(phone, &self.settings().default_phone_region)?;

        let outcome = self
            .retrying(|| {
                let phone = phone.clone();
                Box::pin(async move {
                    let user = self.existing_human(ctx, user_id).await?;
                    let human = user.human().expect("checked human");
                    let owner = user.stream().resource_owner.clone();

                    if human.phone.as_deref() == Some(phone.as_str())
                        && human.phone_verified == is_verified
                    {
                        return Ok(None);
                    }

                    let mut commands = Vec::new();
                    if human.phone.as_deref() != Some(phone.as_str()) {
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, PHONE_CHANGED)
                                .payload(&PhoneChangedPayload {
                                    phone: phone.clone(),
                                })?
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                    }

                    let mut code = None;
                    if is_verified {
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, PHONE_VERIFIED)
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                    } else {
                        let plain = self.codes().otp6();
                        commands.push(
                            EventCommand::new(User::aggregate_type(), user_id, PHONE_CODE_ADDED)
                                .payload(&CodeAddedPayload {
                                    code: VerificationCode::issue(
                                        &plain,
                                        self.settings().code_lifetime,
                                        self.now(),
                                    ),
                                })?
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                        code = Some(plain);
                    }

                    if let Some(first) = commands.first_mut() {
                        first.expected_version = Some(user.version());
                    }
                    self.push(ctx, commands).await?;
                    Ok(code)
                })
            })
            .await?;

        if let Some(code) = outcome {
            self.notifier()
                .send_sms(&phone, &format!("Your code: {code}"))
                .await;
        }
        Ok(())
    }

    pub async fn verify_phone(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if human.phone_verified {
            return Ok(());
        }
        if human.phone.is_none() {
            return Err(Error::not_found("USER-PHONE-001", "no phone set"));
        }
        let pending = human.pending_phone_code.clone().ok_or_else(|| {
            Error::failed_precondition("CODE-005", "no phone verification pending")
        })?;
        let owner = user.stream().resource_owner.clone();

        match pending.verify(code, self.now()) {
            Ok(()) => {
                let command = EventCommand::new(User::aggregate_type(), user_id, PHONE_VERIFIED)
                    .editor(&ctx.editor_user)
                    .owner(&owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            }
            Err(err) if err.code == "CODE-002" => {
                let command = EventCommand::new(User::aggregate_type(), user_id, PHONE_CHECK_FAILED)
                    .editor(&ctx.editor_user)
                    .owner(&owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn remove_phone(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let user = self.existing_human(ctx, user_id).await?;
                if user.human().expect("checked human").phone.is_none() {
                    return Err(Error::not_found("USER-PHONE-001", "no phone set"));
                }
                let command = EventCommand::new(User::aggregate_type(), user_id, PHONE_REMOVED)
                    .editor(&ctx.editor_user)
                    .owner(&user.stream().resource_owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Set a new password, enforcing the effective complexity policy.
    pub async fn change_password(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        new_password: &str,
        current_password: Option<&str>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if new_password.len() > 72 {
            return Err(Error::invalid_argument(
                "PASSWORD-003",
                "password must be at most 72 bytes",
            ));
        }

        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        let owner = user.stream().resource_owner.clone();

        if let Some(current) = current_password {
            let hash = human.password_hash.as_deref().ok_or_else(|| {
                Error::failed_precondition("PASSWORD-005", "no password set")
            })?;
            if !self.hasher().verify(current, hash)? {
                return Err(Error::invalid_argument(
                    "PASSWORD-004",
                    "current password is wrong",
                ));
            }
        }

        self.effective_password_complexity(ctx, Some(&owner))
            .await?
            .check(new_password)?;
        let hash = self.hasher().hash(new_password)?;

        let command = EventCommand::new(User::aggregate_type(), user_id, PASSWORD_CHANGED)
            .payload(&PasswordChangedPayload { hash })?
            .editor(&ctx.editor_user)
            .owner(&owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    /// Verify credentials, recording the outcome and locking the user once
    /// the lockout policy's threshold is crossed.
    pub async fn check_password(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        password: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_user(ctx, user_id).await?;
        if user.state == UserState::Locked {
            return Err(Error::failed_precondition("USER-005", "user is locked"));
        }
        let human = user
            .human()
            .ok_or_else(|| Error::invalid_argument("USER-003", "user is not human"))?;
        let hash = human
            .password_hash
            .as_deref()
            .ok_or_else(|| Error::failed_precondition("PASSWORD-005", "no password set"))?;
        let owner = user.stream().resource_owner.clone();

        if self.hasher().verify(password, hash)? {
            let command =
                EventCommand::new(User::aggregate_type(), user_id, PASSWORD_CHECK_SUCCEEDED)
                    .editor(&ctx.editor_user)
                    .owner(&owner)
                    .expected_version(user.version());
            self.push(ctx, vec![command]).await?;
            return Ok(());
        }

        let mut commands = vec![
            EventCommand::new(User::aggregate_type(), user_id, PASSWORD_CHECK_FAILED)
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(user.version()),
        ];

        let lockout = self.effective_password_lockout(ctx, Some(&owner)).await?;
        if lockout.password_locked(human.password_check_failures + 1) {
            commands.push(
                EventCommand::new(User::aggregate_type(), user_id, USER_LOCKED)
                    .editor(&ctx.editor_user)
                    .owner(&owner),
            );
        }
        self.push(ctx, commands).await?;

        Err(Error::unauthenticated(
            "PASSWORD-006",
            "password check failed",
        ))
    }

    pub async fn lock_user(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.user_state_change(
            ctx,
            user_id,
            USER_LOCKED,
            &[UserState::Active, UserState::Initial],
            "active",
        )
        .await
    }

    pub async fn unlock_user(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.user_state_change(ctx, user_id, USER_UNLOCKED, &[UserState::Locked], "locked")
            .await
    }

    pub async fn deactivate_user(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.user_state_change(
            ctx,
            user_id,
            USER_DEACTIVATED,
            &[UserState::Active, UserState::Initial],
            "active",
        )
        .await
    }

    pub async fn reactivate_user(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.user_state_change(
            ctx,
            user_id,
            USER_REACTIVATED,
            &[UserState::Inactive],
            "inactive",
        )
        .await
    }

    /// Remove a user and release its username claim.
    pub async fn remove_user(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let user = self.existing_user(ctx, user_id).await?;
                let org_id = user.stream().resource_owner.clone();
                let command = EventCommand::new(User::aggregate_type(), user_id, USER_REMOVED)
                    .editor(&ctx.editor_user)
                    .owner(&org_id)
                    .expected_version(user.version())
                    .unique_constraint(UniqueConstraint::remove(
                        UNIQUE_USERNAMES,
                        &username_field(&org_id, &user.username),
                    ));
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn user_state_change(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        event_type: &'static str,
        allowed: &'static [UserState],
        required_name: &'static str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let user = self.existing_user(ctx, user_id).await?;
                if !allowed.contains(&user.state) {
                    return Err(Error::failed_precondition(
                        "USER-006",
                        format!("user is not {required_name}"),
                    ));
                }
                let command = EventCommand::new(User::aggregate_type(), user_id, event_type)
                    .editor(&ctx.editor_user)
                    .owner(&user.stream().resource_owner)
                    .expected_version(user.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Load a user that must exist and not be deleted.
    pub(crate) async fn existing_user(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> AppResult<User> {
        let user: User = self.load(&ctx.instance_id, user_id).await?;
        if !user.exists() || user.state == UserState::Deleted {
            return Err(Error::not_found(
                "USER-002",
                format!("user not found: {user_id}"),
            ));
        }
        Ok(user)
    }

    /// Load a user that must additionally be human.
    pub(crate) async fn existing_human(
        &self,
        ctx: &CommandContext,
        user_id: &str,
    ) -> AppResult<User> {
        let user = self.existing_user(ctx, user_id).await?;
        if !user.is_human() {
            return Err(Error::invalid_argument("USER-003", "user is not human"));
        }
        Ok(user)
    }
}
