//! Command engine
//!
//! Validate → load → decide → append. Every command validates its input
//! before any I/O, reduces the target aggregate from its event stream,
//! decides on 0..N events and pushes them with the loaded version as the
//! optimistic-concurrency expectation. Concurrency conflicts retry the
//! whole command with exponential backoff.

mod action;
mod app;
mod idp;
mod notify_config;
mod org;
mod policy;
mod project;
mod session;
mod user;
mod user_auth;
mod web_key;

pub use app::{AddOidcAppRequest, AddSamlAppRequest, OidcAppCreated};
pub use idp::{AddJwtIdpRequest, AddOidcIdpRequest, AddSamlIdpRequest};
pub use notify_config::{AddSmtpConfigRequest, AddSmsHttpConfigRequest, AddSmsTwilioConfigRequest};
pub use session::{CreateOidcSessionRequest, CreateSessionRequest};
pub use user::{AddHumanUserRequest, AddMachineUserRequest};

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::aggregate::{reduce, Aggregate};
use crate::domain::RegionPhoneNormalizer;
use crate::error::{AppResult, Error};
use crate::event_store::{Event, EventCommand, EventFilter, EventStore};
use crate::ports::{
    Clock, CodeGenerator, DomainProbe, IdGenerator, Notifier, PasswordHasher, PhoneNormalizer,
};
use crate::ports::{
    DenyingDomainProbe, NoopNotifier, RandomCodeGenerator, RandomIdGenerator, Sha256PasswordHasher,
    SystemClock,
};

/// Caller metadata stamped onto every event.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub instance_id: String,
    pub editor_user: String,
    /// Absolute deadline; expired contexts fail with DeadlineExceeded.
    pub deadline: Option<DateTime<Utc>>,
}

impl CommandContext {
    pub fn new(instance_id: &str, editor_user: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            editor_user: editor_user.to_string(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub code_lifetime: Duration,
    pub default_phone_region: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
            code_lifetime: Duration::from_secs(3600),
            default_phone_region: "CH".to_string(),
        }
    }
}

type CommandFuture<'a, T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>;

/// Command service: owns the store and the injected ports.
#[derive(Clone)]
pub struct Commands {
    store: EventStore,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    hasher: Arc<dyn PasswordHasher>,
    phones: Arc<dyn PhoneNormalizer>,
    codes: Arc<dyn CodeGenerator>,
    probe: Arc<dyn DomainProbe>,
    notifier: Arc<dyn Notifier>,
    config: CommandConfig,
}

impl Commands {
    pub fn new(store: EventStore) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIdGenerator),
            hasher: Arc::new(Sha256PasswordHasher),
            phones: Arc::new(RegionPhoneNormalizer),
            codes: Arc::new(RandomCodeGenerator),
            probe: Arc::new(DenyingDomainProbe),
            notifier: Arc::new(NoopNotifier),
            config: CommandConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CommandConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_password_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_phone_normalizer(mut self, phones: Arc<dyn PhoneNormalizer>) -> Self {
        self.phones = phones;
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_domain_probe(mut self, probe: Arc<dyn DomainProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Shared plumbing used by the per-domain command modules
    // -----------------------------------------------------------------------

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn next_id(&self) -> String {
        self.ids.next_id()
    }

    pub(crate) fn hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }

    pub(crate) fn phones(&self) -> &dyn PhoneNormalizer {
        self.phones.as_ref()
    }

    pub(crate) fn codes(&self) -> &dyn CodeGenerator {
        self.codes.as_ref()
    }

    pub(crate) fn probe(&self) -> &dyn DomainProbe {
        self.probe.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn settings(&self) -> &CommandConfig {
        &self.config
    }

    /// Fail fast when the caller's deadline has passed.
    pub(crate) fn ensure_deadline(&self, ctx: &CommandContext) -> AppResult<()> {
        if let Some(deadline) = ctx.deadline {
            if self.clock.now() > deadline {
                return Err(Error::deadline_exceeded("CTX-001", "deadline exceeded"));
            }
        }
        Ok(())
    }

    /// Load one aggregate by replaying its stream.
    pub(crate) async fn load<A: Aggregate>(
        &self,
        instance_id: &str,
        aggregate_id: &str,
    ) -> AppResult<A> {
        let events = self
            .store
            .query(EventFilter::aggregate(
                instance_id,
                A::aggregate_type(),
                aggregate_id,
            ))
            .await?;
        reduce(&events)
    }

    /// Load every aggregate of one type within the instance.
    pub(crate) async fn load_all<A: Aggregate>(&self, instance_id: &str) -> AppResult<Vec<A>> {
        let events = self
            .store
            .query(EventFilter::instance(instance_id).aggregate_type(A::aggregate_type()))
            .await?;

        let mut grouped: BTreeMap<String, Vec<&Event>> = BTreeMap::new();
        for event in &events {
            grouped
                .entry(event.aggregate_id.clone())
                .or_default()
                .push(event);
        }

        let mut models = Vec::with_capacity(grouped.len());
        for stream in grouped.into_values() {
            let mut model = A::default();
            for event in stream {
                model.apply(event)?;
            }
            models.push(model);
        }
        Ok(models)
    }

    /// Append the decided events.
    pub(crate) async fn push(
        &self,
        ctx: &CommandContext,
        commands: Vec<EventCommand>,
    ) -> AppResult<Vec<Event>> {
        self.ensure_deadline(ctx)?;
        Ok(self.store.push(&ctx.instance_id, commands).await?)
    }

    /// Run the whole command again on concurrency conflicts, up to the
    /// configured attempt count with exponential backoff.
    pub(crate) async fn retrying<'a, T>(
        &'a self,
        op: impl Fn() -> CommandFuture<'a, T> + Send + 'a,
    ) -> AppResult<T> {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(err) if err.is_concurrency_conflict() && attempt + 1 < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max = self.config.max_retries,
                        "concurrency conflict, retrying command"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_defaults() {
        let config = CommandConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.default_phone_region, "CH");
    }

    #[test]
    fn test_context_builder() {
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        let ctx = CommandContext::new("i1", "admin").with_deadline(deadline);
        assert_eq!(ctx.instance_id, "i1");
        assert_eq!(ctx.editor_user, "admin");
        assert_eq!(ctx.deadline, Some(deadline));
    }
}
