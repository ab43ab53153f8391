//! SMTP and SMS configuration commands
//!
//! At most one config per channel is active; activating one deactivates
//! the current one in the same push, and activating an already-active
//! config emits nothing.

use crate::aggregate::notify::{
    ConfigState, SmsChangedPayload, SmsHttpAddedPayload, SmsProvider, SmsTwilioAddedPayload,
    SmtpAddedPayload, SmtpChangedPayload, SMS_ACTIVATED, SMS_DEACTIVATED, SMS_HTTP_ADDED,
    SMS_REMOVED, SMS_TWILIO_ADDED, SMS_CHANGED, SMTP_ACTIVATED, SMTP_ADDED, SMTP_CHANGED,
    SMTP_DEACTIVATED, SMTP_REMOVED,
};
use crate::aggregate::{Aggregate, SmsConfig, SmtpConfig};
use crate::domain::validation::{require_non_empty, validate_email, validate_url};
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

#[derive(Debug, Clone)]
pub struct AddSmtpConfigRequest {
    pub description: Option<String>,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub reply_to_address: Option<String>,
    pub host: String,
    pub user: Option<String>,
    pub tls: bool,
}

#[derive(Debug, Clone)]
pub struct AddSmsTwilioConfigRequest {
    pub description: Option<String>,
    pub sid: String,
    pub sender_number: String,
}

#[derive(Debug, Clone)]
pub struct AddSmsHttpConfigRequest {
    pub description: Option<String>,
    pub endpoint: String,
}

impl Commands {
    // -----------------------------------------------------------------------
    // SMTP
    // -----------------------------------------------------------------------

    pub async fn add_smtp_config(
        &self,
        ctx: &CommandContext,
        request: AddSmtpConfigRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        validate_email(&request.sender_address)?;
        require_non_empty(&request.host, "SMTP-001", "smtp host")?;
        if let Some(reply_to) = &request.reply_to_address {
            validate_email(reply_to)?;
        }

        let config_id = self.next_id();
        let command = EventCommand::new(SmtpConfig::aggregate_type(), &config_id, SMTP_ADDED)
            .payload(&SmtpAddedPayload {
                description: request.description,
                sender_address: request.sender_address,
                sender_name: request.sender_name,
                reply_to_address: request.reply_to_address,
                host: request.host,
                user: request.user,
                tls: request.tls,
            })?
            .editor(&ctx.editor_user)
            .owner(&ctx.instance_id)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(config_id)
    }

    pub async fn change_smtp_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
        changes: SmtpChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(sender) = &changes.sender_address {
            validate_email(sender)?;
        }
        if let Some(host) = &changes.host {
            require_non_empty(host, "SMTP-001", "smtp host")?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let config = self.live_smtp_config(ctx, config_id).await?;

                let mut effective = changes;
                if effective.description == config.description {
                    effective.description = None;
                }
                if effective.sender_address.as_deref() == Some(config.sender_address.as_str()) {
                    effective.sender_address = None;
                }
                if effective.sender_name == config.sender_name {
                    effective.sender_name = None;
                }
                if effective.reply_to_address == config.reply_to_address {
                    effective.reply_to_address = None;
                }
                if effective.host.as_deref() == Some(config.host.as_str()) {
                    effective.host = None;
                }
                if effective.user == config.user {
                    effective.user = None;
                }
                if effective.tls == Some(config.tls) {
                    effective.tls = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command =
                    EventCommand::new(SmtpConfig::aggregate_type(), config_id, SMTP_CHANGED)
                        .payload(&effective)?
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Activate a config; the currently active one (if any) is
    /// deactivated in the same push. Activating the active config is a
    /// no-op.
    pub async fn activate_smtp_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let configs: Vec<SmtpConfig> = self.load_all(&ctx.instance_id).await?;
                let target = configs
                    .iter()
                    .find(|c| c.stream().aggregate_id == config_id && c.is_live())
                    .ok_or_else(|| {
                        Error::not_found(
                            "SMTP-002",
                            format!("smtp config not found: {config_id}"),
                        )
                    })?;
                if target.state == ConfigState::Active {
                    return Ok(());
                }

                let mut commands = Vec::new();
                for config in &configs {
                    if config.state == ConfigState::Active {
                        commands.push(
                            EventCommand::new(
                                SmtpConfig::aggregate_type(),
                                &config.stream().aggregate_id,
                                SMTP_DEACTIVATED,
                            )
                            .editor(&ctx.editor_user)
                            .owner(&ctx.instance_id)
                            .expected_version(config.version()),
                        );
                    }
                }
                commands.push(
                    EventCommand::new(SmtpConfig::aggregate_type(), config_id, SMTP_ACTIVATED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(target.version()),
                );
                self.push(ctx, commands).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_smtp_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let config = self.live_smtp_config(ctx, config_id).await?;
                if config.state != ConfigState::Active {
                    return Err(Error::failed_precondition(
                        "SMTP-003",
                        "smtp config is not active",
                    ));
                }
                let command =
                    EventCommand::new(SmtpConfig::aggregate_type(), config_id, SMTP_DEACTIVATED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_smtp_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let config = self.live_smtp_config(ctx, config_id).await?;
                let command =
                    EventCommand::new(SmtpConfig::aggregate_type(), config_id, SMTP_REMOVED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // SMS
    // -----------------------------------------------------------------------

    pub async fn add_sms_config_twilio(
        &self,
        ctx: &CommandContext,
        request: AddSmsTwilioConfigRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        require_non_empty(&request.sid, "SMS-001", "twilio sid")?;
        require_non_empty(&request.sender_number, "SMS-002", "sender number")?;

        let config_id = self.next_id();
        let command = EventCommand::new(SmsConfig::aggregate_type(), &config_id, SMS_TWILIO_ADDED)
            .payload(&SmsTwilioAddedPayload {
                description: request.description,
                sid: request.sid,
                sender_number: request.sender_number,
            })?
            .editor(&ctx.editor_user)
            .owner(&ctx.instance_id)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(config_id)
    }

    pub async fn add_sms_config_http(
        &self,
        ctx: &CommandContext,
        request: AddSmsHttpConfigRequest,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        validate_url(&request.endpoint)?;

        let config_id = self.next_id();
        let command = EventCommand::new(SmsConfig::aggregate_type(), &config_id, SMS_HTTP_ADDED)
            .payload(&SmsHttpAddedPayload {
                description: request.description,
                endpoint: request.endpoint,
            })?
            .editor(&ctx.editor_user)
            .owner(&ctx.instance_id)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(config_id)
    }

    pub async fn change_sms_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
        changes: SmsChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(endpoint) = &changes.endpoint {
            validate_url(endpoint)?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let config = self.live_sms_config(ctx, config_id).await?;

                let mut effective = changes;
                if effective.description == config.description {
                    effective.description = None;
                }
                match &config.provider {
                    Some(SmsProvider::Twilio { sid, sender_number }) => {
                        if effective.endpoint.is_some() {
                            return Err(Error::invalid_argument(
                                "SMS-003",
                                "endpoint is not valid for a twilio config",
                            ));
                        }
                        if effective.sid.as_deref() == Some(sid.as_str()) {
                            effective.sid = None;
                        }
                        if effective.sender_number.as_deref() == Some(sender_number.as_str()) {
                            effective.sender_number = None;
                        }
                    }
                    Some(SmsProvider::Http { endpoint }) => {
                        if effective.sid.is_some() || effective.sender_number.is_some() {
                            return Err(Error::invalid_argument(
                                "SMS-004",
                                "twilio fields are not valid for an http config",
                            ));
                        }
                        if effective.endpoint.as_deref() == Some(endpoint.as_str()) {
                            effective.endpoint = None;
                        }
                    }
                    None => {}
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command = EventCommand::new(SmsConfig::aggregate_type(), config_id, SMS_CHANGED)
                    .payload(&effective)?
                    .editor(&ctx.editor_user)
                    .owner(&ctx.instance_id)
                    .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn activate_sms_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let configs: Vec<SmsConfig> = self.load_all(&ctx.instance_id).await?;
                let target = configs
                    .iter()
                    .find(|c| c.stream().aggregate_id == config_id && c.is_live())
                    .ok_or_else(|| {
                        Error::not_found("SMS-005", format!("sms config not found: {config_id}"))
                    })?;
                if target.state == ConfigState::Active {
                    return Ok(());
                }

                let mut commands = Vec::new();
                for config in &configs {
                    if config.state == ConfigState::Active {
                        commands.push(
                            EventCommand::new(
                                SmsConfig::aggregate_type(),
                                &config.stream().aggregate_id,
                                SMS_DEACTIVATED,
                            )
                            .editor(&ctx.editor_user)
                            .owner(&ctx.instance_id)
                            .expected_version(config.version()),
                        );
                    }
                }
                commands.push(
                    EventCommand::new(SmsConfig::aggregate_type(), config_id, SMS_ACTIVATED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(target.version()),
                );
                self.push(ctx, commands).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_sms_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let config = self.live_sms_config(ctx, config_id).await?;
                if config.state != ConfigState::Active {
                    return Err(Error::failed_precondition(
                        "SMS-006",
                        "sms config is not active",
                    ));
                }
                let command =
                    EventCommand::new(SmsConfig::aggregate_type(), config_id, SMS_DEACTIVATED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_sms_config(&self, ctx: &CommandContext, config_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let config = self.live_sms_config(ctx, config_id).await?;
                let command =
                    EventCommand::new(SmsConfig::aggregate_type(), config_id, SMS_REMOVED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(config.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn live_smtp_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<SmtpConfig> {
        let config: SmtpConfig = self.load(&ctx.instance_id, config_id).await?;
        if !config.is_live() {
            return Err(Error::not_found(
                "SMTP-002",
                format!("smtp config not found: {config_id}"),
            ));
        }
        Ok(config)
    }

    async fn live_sms_config(
        &self,
        ctx: &CommandContext,
        config_id: &str,
    ) -> AppResult<SmsConfig> {
        let config: SmsConfig = self.load(&ctx.instance_id, config_id).await?;
        if !config.is_live() {
            return Err(Error::not_found(
                "SMS-005",
                format!("sms config not found: {config_id}"),
            ));
        }
        Ok(config)
    }
}
