//! User auth-factor commands: TOTP, SMS/email OTP, U2F, passwordless.

use crate::aggregate::user::{
    CodeAddedPayload, TotpAddedPayload, WebAuthnTokenAddedPayload, WebAuthnTokenRemovedPayload,
    WebAuthnTokenVerifiedPayload, WebAuthnToken, OTP_EMAIL_ADDED, OTP_EMAIL_CHECK_FAILED,
    OTP_EMAIL_CHECK_SUCCEEDED, OTP_EMAIL_CODE_ADDED, OTP_EMAIL_REMOVED, OTP_SMS_ADDED,
    OTP_SMS_CHECK_FAILED, OTP_SMS_CHECK_SUCCEEDED, OTP_SMS_CODE_ADDED, OTP_SMS_REMOVED,
    PASSWORDLESS_TOKEN_ADDED, PASSWORDLESS_TOKEN_REMOVED, PASSWORDLESS_TOKEN_VERIFIED, TOTP_ADDED,
    TOTP_CHECK_FAILED, TOTP_CHECK_SUCCEEDED, TOTP_REMOVED, TOTP_VERIFIED, U2F_TOKEN_ADDED,
    U2F_TOKEN_REMOVED, U2F_TOKEN_VERIFIED,
};
use crate::aggregate::{Aggregate, User};
use crate::domain::validation::validate_otp;
use crate::domain::VerificationCode;
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

impl Commands {
    // -----------------------------------------------------------------------
    // TOTP
    // -----------------------------------------------------------------------

    /// Enroll a TOTP authenticator; returns the shared secret for the
    /// authenticator app. Re-enrolling replaces an unverified secret.
    pub async fn add_totp(&self, ctx: &CommandContext, user_id: &str) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if human.totp_verified {
            return Err(Error::already_exists(
                "USER-MFA-001",
                "totp is already set up",
            ));
        }

        let secret = self.codes().token32();
        let command = EventCommand::new(User::aggregate_type(), user_id, TOTP_ADDED)
            .payload(&TotpAddedPayload {
                secret: secret.clone(),
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(secret)
    }

    /// Confirm enrollment with a first code from the authenticator.
    pub async fn verify_totp(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        validate_otp(code)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        let secret = human
            .totp_secret
            .as_deref()
            .ok_or_else(|| Error::failed_precondition("USER-MFA-002", "totp is not set up"))?;
        if human.totp_verified {
            return Ok(());
        }
        let owner = user.stream().resource_owner.clone();

        if self.codes().verify_totp(secret, code) {
            let command = EventCommand::new(User::aggregate_type(), user_id, TOTP_VERIFIED)
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(user.version());
            self.push(ctx, vec![command]).await?;
            Ok(())
        } else {
            let command = EventCommand::new(User::aggregate_type(), user_id, TOTP_CHECK_FAILED)
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(user.version());
            self.push(ctx, vec![command]).await?;
            Err(Error::invalid_argument("USER-MFA-003", "totp code invalid"))
        }
    }

    /// Check a login-time TOTP code.
    pub async fn check_totp(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        validate_otp(code)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !human.totp_verified {
            return Err(Error::failed_precondition(
                "USER-MFA-002",
                "totp is not set up",
            ));
        }
        let secret = human.totp_secret.as_deref().unwrap_or_default().to_string();
        if self.codes().verify_totp(&secret, code) {
            self.record_otp_check(ctx, &user, true, TOTP_CHECK_SUCCEEDED, TOTP_CHECK_FAILED)
                .await
        } else {
            self.record_otp_check(ctx, &user, false, TOTP_CHECK_SUCCEEDED, TOTP_CHECK_FAILED)
                .await?;
            Err(Error::invalid_argument("USER-MFA-003", "totp code invalid"))
        }
    }

    pub async fn remove_totp(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        if user.human().expect("checked human").totp_secret.is_none() {
            return Err(Error::not_found("USER-MFA-002", "totp is not set up"));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, TOTP_REMOVED)
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // SMS OTP
    // -----------------------------------------------------------------------

    pub async fn add_otp_sms(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !human.phone_verified {
            return Err(Error::failed_precondition(
                "USER-MFA-005",
                "phone must be verified for sms otp",
            ));
        }
        if human.otp_sms_enabled {
            return Err(Error::already_exists(
                "USER-MFA-006",
                "sms otp is already set up",
            ));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_SMS_ADDED)
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    pub async fn remove_otp_sms(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        if !user.human().expect("checked human").otp_sms_enabled {
            return Err(Error::not_found("USER-MFA-004", "sms otp is not set up"));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_SMS_REMOVED)
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    /// Issue and deliver a fresh SMS one-time code.
    pub async fn send_otp_sms_code(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !human.otp_sms_enabled {
            return Err(Error::failed_precondition(
                "USER-MFA-004",
                "sms otp is not set up",
            ));
        }
        let phone = human
            .phone
            .clone()
            .ok_or_else(|| Error::failed_precondition("USER-PHONE-001", "no phone set"))?;

        let code = self.codes().otp6();
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_SMS_CODE_ADDED)
            .payload(&CodeAddedPayload {
                code: VerificationCode::issue(&code, self.settings().code_lifetime, self.now()),
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;

        self.notifier()
            .send_sms(&phone, &format!("Your code: {code}"))
            .await;
        Ok(())
    }

    pub async fn check_otp_sms(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        validate_otp(code)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        let pending = human
            .pending_otp_sms_code
            .clone()
            .ok_or_else(|| Error::failed_precondition("CODE-005", "no sms otp pending"))?;

        match pending.verify(code, self.now()) {
            Ok(()) => {
                self.record_otp_check(ctx, &user, true, OTP_SMS_CHECK_SUCCEEDED, OTP_SMS_CHECK_FAILED)
                    .await
            }
            Err(err) if err.code == "CODE-002" => {
                self.record_otp_check(ctx, &user, false, OTP_SMS_CHECK_SUCCEEDED, OTP_SMS_CHECK_FAILED)
                    .await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // Email OTP
    // -----------------------------------------------------------------------

    pub async fn add_otp_email(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !human.email_verified {
            return Err(Error::failed_precondition(
                "USER-MFA-009",
                "email must be verified for email otp",
            ));
        }
        if human.otp_email_enabled {
            return Err(Error::already_exists(
                "USER-MFA-010",
                "email otp is already set up",
            ));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_EMAIL_ADDED)
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    pub async fn remove_otp_email(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        if !user.human().expect("checked human").otp_email_enabled {
            return Err(Error::not_found("USER-MFA-011", "email otp is not set up"));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_EMAIL_REMOVED)
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    pub async fn send_otp_email_code(&self, ctx: &CommandContext, user_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !human.otp_email_enabled {
            return Err(Error::failed_precondition(
                "USER-MFA-011",
                "email otp is not set up",
            ));
        }
        let email = human.email.clone();

        let code = self.codes().otp6();
        let command = EventCommand::new(User::aggregate_type(), user_id, OTP_EMAIL_CODE_ADDED)
            .payload(&CodeAddedPayload {
                code: VerificationCode::issue(&code, self.settings().code_lifetime, self.now()),
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;

        self.notifier()
            .send_email(&email, "Your one-time code", &format!("Your code: {code}"))
            .await;
        Ok(())
    }

    pub async fn check_otp_email(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        code: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        validate_otp(code)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        let pending = human
            .pending_otp_email_code
            .clone()
            .ok_or_else(|| Error::failed_precondition("CODE-005", "no email otp pending"))?;

        match pending.verify(code, self.now()) {
            Ok(()) => {
                self.record_otp_check(
                    ctx,
                    &user,
                    true,
                    OTP_EMAIL_CHECK_SUCCEEDED,
                    OTP_EMAIL_CHECK_FAILED,
                )
                .await
            }
            Err(err) if err.code == "CODE-002" => {
                self.record_otp_check(
                    ctx,
                    &user,
                    false,
                    OTP_EMAIL_CHECK_SUCCEEDED,
                    OTP_EMAIL_CHECK_FAILED,
                )
                .await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // U2F / passwordless (WebAuthn ceremony happens outside the core)
    // -----------------------------------------------------------------------

    pub async fn add_u2f(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        name: Option<String>,
    ) -> AppResult<String> {
        self.webauthn_add(ctx, user_id, name, U2F_TOKEN_ADDED).await
    }

    pub async fn verify_u2f(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
        name: Option<String>,
    ) -> AppResult<()> {
        self.webauthn_verify(ctx, user_id, token_id, name, U2F_TOKEN_VERIFIED, |human| {
            &human.u2f_tokens
        })
        .await
    }

    pub async fn remove_u2f(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
    ) -> AppResult<()> {
        self.webauthn_remove(ctx, user_id, token_id, U2F_TOKEN_REMOVED, |human| {
            &human.u2f_tokens
        })
        .await
    }

    pub async fn add_passwordless(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        name: Option<String>,
    ) -> AppResult<String> {
        self.webauthn_add(ctx, user_id, name, PASSWORDLESS_TOKEN_ADDED)
            .await
    }

    pub async fn verify_passwordless(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
        name: Option<String>,
    ) -> AppResult<()> {
        self.webauthn_verify(
            ctx,
            user_id,
            token_id,
            name,
            PASSWORDLESS_TOKEN_VERIFIED,
            |human| &human.passwordless_tokens,
        )
        .await
    }

    pub async fn remove_passwordless(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
    ) -> AppResult<()> {
        self.webauthn_remove(
            ctx,
            user_id,
            token_id,
            PASSWORDLESS_TOKEN_REMOVED,
            |human| &human.passwordless_tokens,
        )
        .await
    }

    async fn webauthn_add(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        name: Option<String>,
        event_type: &'static str,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let token_id = self.next_id();
        let command = EventCommand::new(User::aggregate_type(), user_id, event_type)
            .payload(&WebAuthnTokenAddedPayload {
                token_id: token_id.clone(),
                name,
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(token_id)
    }

    async fn webauthn_verify(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
        name: Option<String>,
        event_type: &'static str,
        tokens: impl Fn(&crate::aggregate::user::HumanState) -> &Vec<WebAuthnToken>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        let token = tokens(human)
            .iter()
            .find(|t| t.token_id == token_id)
            .ok_or_else(|| Error::not_found("USER-MFA-007", "webauthn token not found"))?;
        if token.verified {
            return Ok(());
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, event_type)
            .payload(&WebAuthnTokenVerifiedPayload {
                token_id: token_id.to_string(),
                name,
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    async fn webauthn_remove(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        token_id: &str,
        event_type: &'static str,
        tokens: impl Fn(&crate::aggregate::user::HumanState) -> &Vec<WebAuthnToken>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        let user = self.existing_human(ctx, user_id).await?;
        let human = user.human().expect("checked human");
        if !tokens(human).iter().any(|t| t.token_id == token_id) {
            return Err(Error::not_found("USER-MFA-007", "webauthn token not found"));
        }
        let command = EventCommand::new(User::aggregate_type(), user_id, event_type)
            .payload(&WebAuthnTokenRemovedPayload {
                token_id: token_id.to_string(),
            })?
            .editor(&ctx.editor_user)
            .owner(&user.stream().resource_owner)
            .expected_version(user.version());
        self.push(ctx, vec![command]).await?;
        Ok(())
    }

    /// Record an OTP check outcome, locking the user when the lockout
    /// policy's OTP threshold is crossed.
    async fn record_otp_check(
        &self,
        ctx: &CommandContext,
        user: &User,
        ok: bool,
        succeeded_type: &'static str,
        failed_type: &'static str,
    ) -> AppResult<()> {
        let owner = user.stream().resource_owner.clone();
        let user_id = &user.stream().aggregate_id;

        if ok {
            let command = EventCommand::new(User::aggregate_type(), user_id, succeeded_type)
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(user.version());
            self.push(ctx, vec![command]).await?;
            return Ok(());
        }

        let mut commands = vec![
            EventCommand::new(User::aggregate_type(), user_id, failed_type)
                .editor(&ctx.editor_user)
                .owner(&owner)
                .expected_version(user.version()),
        ];

        let failures = user.human().map(|h| h.otp_check_failures).unwrap_or(0);
        let lockout = self.effective_password_lockout(ctx, Some(&owner)).await?;
        if lockout.otp_locked(failures + 1) {
            commands.push(
                EventCommand::new(User::aggregate_type(), user_id, crate::aggregate::user::USER_LOCKED)
                    .editor(&ctx.editor_user)
                    .owner(&owner),
            );
        }
        self.push(ctx, commands).await?;
        Ok(())
    }
}
