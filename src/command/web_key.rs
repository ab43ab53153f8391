//! Web key commands
//!
//! Key lifecycle only; material handling lives outside the core.

use crate::aggregate::web_key::{
    WebKeyConfig, WebKeyGeneratedPayload, WebKeyState, WEB_KEY_ACTIVATED, WEB_KEY_DEACTIVATED,
    WEB_KEY_GENERATED, WEB_KEY_REMOVED,
};
use crate::aggregate::{Aggregate, WebKey};
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

impl Commands {
    /// Record a newly generated signing key in state Initial.
    pub async fn generate_web_key(
        &self,
        ctx: &CommandContext,
        config: WebKeyConfig,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        if let WebKeyConfig::Rsa { bits, .. } = &config {
            if ![2048u32, 3072, 4096].contains(bits) {
                return Err(Error::invalid_argument(
                    "WEBKEY-005",
                    format!("unsupported rsa key size: {bits}"),
                ));
            }
        }

        let key_id = self.next_id();
        let command = EventCommand::new(WebKey::aggregate_type(), &key_id, WEB_KEY_GENERATED)
            .payload(&WebKeyGeneratedPayload { config })?
            .editor(&ctx.editor_user)
            .owner(&ctx.instance_id)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(key_id)
    }

    /// Activate a key; the previously active key is deactivated in the
    /// same push. Activating an active key is an error.
    pub async fn activate_web_key(&self, ctx: &CommandContext, key_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let keys: Vec<WebKey> = self.load_all(&ctx.instance_id).await?;
                let target = keys
                    .iter()
                    .find(|k| k.stream().aggregate_id == key_id && k.state != WebKeyState::Removed && k.exists())
                    .ok_or_else(|| {
                        Error::not_found("WEBKEY-001", format!("web key not found: {key_id}"))
                    })?;
                if target.state == WebKeyState::Active {
                    return Err(Error::failed_precondition(
                        "WEBKEY-002",
                        "web key is already active",
                    ));
                }

                let mut commands = Vec::new();
                for key in &keys {
                    if key.state == WebKeyState::Active {
                        commands.push(
                            EventCommand::new(
                                WebKey::aggregate_type(),
                                &key.stream().aggregate_id,
                                WEB_KEY_DEACTIVATED,
                            )
                            .editor(&ctx.editor_user)
                            .owner(&ctx.instance_id)
                            .expected_version(key.version()),
                        );
                    }
                }
                commands.push(
                    EventCommand::new(WebKey::aggregate_type(), key_id, WEB_KEY_ACTIVATED)
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

    /// Deactivating anything but an active key is an error.
    pub async fn deactivate_web_key(&self, ctx: &CommandContext, key_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let key = self.existing_web_key(ctx, key_id).await?;
                if key.state != WebKeyState::Active {
                    return Err(Error::failed_precondition(
                        "WEBKEY-003",
                        "web key is not active",
                    ));
                }
                let command =
                    EventCommand::new(WebKey::aggregate_type(), key_id, WEB_KEY_DEACTIVATED)
                        .editor(&ctx.editor_user)
                        .owner(&ctx.instance_id)
                        .expected_version(key.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// The active key cannot be removed.
    pub async fn remove_web_key(&self, ctx: &CommandContext, key_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let key = self.existing_web_key(ctx, key_id).await?;
                if key.state == WebKeyState::Active {
                    return Err(Error::failed_precondition(
                        "WEBKEY-004",
                        "active web key cannot be removed",
                    ));
                }
                let command = EventCommand::new(WebKey::aggregate_type(), key_id, WEB_KEY_REMOVED)
                    .editor(&ctx.editor_user)
                    .owner(&ctx.instance_id)
                    .expected_version(key.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn existing_web_key(&self, ctx: &CommandContext, key_id: &str) -> AppResult<WebKey> {
        let key: WebKey = self.load(&ctx.instance_id, key_id).await?;
        if !key.exists() || key.state == WebKeyState::Removed {
            return Err(Error::not_found(
                "WEBKEY-001",
                format!("web key not found: {key_id}"),
            ));
        }
        Ok(key)
    }
}
