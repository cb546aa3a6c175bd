// Email activity
//
// The only side effect a cadence has is sending email. Delivery is mocked:
// a send is logged and kept in an in-memory outbox.
// Decision: Deliveries are keyed by the attempt's idempotency key, so an
// attempt re-dispatched after a crash returns the original result instead of
// sending twice.

use async_trait::async_trait;
use cadence_durable::{Activity, ActivityContext, ActivityError};
use cadence_schemas::{SendEmailInput, SendEmailOutput};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Error type reported when the provider refuses a send
pub const PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";

/// An email the mock provider accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub idempotency_key: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub message_id: String,
}

/// Mock send_email activity
///
/// Stands in for a mail provider. Its record of deliveries lives exactly as
/// long as the activity value, the way a provider's dedup window would; a
/// fresh process starts with an empty provider.
#[derive(Debug, Default)]
pub struct SendEmailActivity {
    /// Results by idempotency key, one entry per accepted attempt
    ///
    /// Never pruned: dropping a key would let a re-dispatched attempt send
    /// again.
    delivered: DashMap<String, SendEmailOutput>,

    /// Accepted emails in send order, kept for inspection until the
    /// activity is dropped
    outbox: Mutex<Vec<SentEmail>>,

    /// Remaining forced failures by subject
    failures: DashMap<String, u32>,

    /// Subjects whose next send is accepted but never acknowledged
    stalls: DashMap<String, ()>,
}

impl SendEmailActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted email, oldest first
    pub fn outbox(&self) -> Vec<SentEmail> {
        self.outbox.lock().clone()
    }

    /// Refuse the next `times` sends with this subject
    pub fn fail_subject(&self, subject: impl Into<String>, times: u32) {
        self.failures.insert(subject.into(), times);
    }

    /// Accept the next send with this subject, then hang until cancelled
    ///
    /// Simulates a process dying after the provider accepted a message but
    /// before the result was recorded.
    pub fn stall_subject(&self, subject: impl Into<String>) {
        self.stalls.insert(subject.into(), ());
    }

    fn refuse(&self, subject: &str) -> bool {
        match self.failures.get_mut(subject) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Activity for SendEmailActivity {
    const TYPE: &'static str = "send_email";
    type Input = SendEmailInput;
    type Output = SendEmailOutput;

    async fn execute(
        &self,
        ctx: &ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError> {
        if let Some(output) = self.delivered.get(&ctx.idempotency_key) {
            info!(
                idempotency_key = %ctx.idempotency_key,
                message_id = %output.message_id,
                "email already sent for this attempt, returning recorded result"
            );
            return Ok(output.clone());
        }

        if self.refuse(&input.subject) {
            warn!(
                workflow_id = %ctx.workflow_id,
                activity_id = %ctx.activity_id,
                attempt = ctx.attempt,
                to = %input.to,
                "mail provider refused send"
            );
            return Err(ActivityError::retryable(format!(
                "mail provider refused send to {}",
                input.to
            ))
            .with_type(PROVIDER_UNAVAILABLE));
        }

        info!(
            "[MOCK EMAIL] To: {} | Subject: {} | Body: {}",
            input.to, input.subject, input.body
        );

        let output = SendEmailOutput {
            success: true,
            message_id: Uuid::now_v7().to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.delivered
            .insert(ctx.idempotency_key.clone(), output.clone());
        self.outbox.lock().push(SentEmail {
            idempotency_key: ctx.idempotency_key.clone(),
            to: input.to,
            subject: input.subject.clone(),
            body: input.body,
            message_id: output.message_id.clone(),
        });

        if self.stalls.remove(&input.subject).is_some() {
            ctx.cancelled().await;
            return Err(ActivityError::retryable("send acknowledgement lost"));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(subject: &str) -> SendEmailInput {
        SendEmailInput {
            to: "ada@example.com".to_string(),
            subject: subject.to_string(),
            body: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_records_outbox() {
        let activity = SendEmailActivity::new();
        let ctx = ActivityContext::new("cadence-e1", "send-0", 1, 3);

        let output = activity.execute(&ctx, input("Welcome")).await.unwrap();

        assert!(output.success);
        let now_ms = Utc::now().timestamp_millis();
        assert!(output.timestamp <= now_ms && output.timestamp > now_ms - 60_000);
        let outbox = activity.outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "ada@example.com");
        assert_eq!(outbox[0].message_id, output.message_id);
        assert_eq!(outbox[0].idempotency_key, "cadence-e1:send-0:1");
    }

    #[tokio::test]
    async fn test_repeated_key_does_not_send_twice() {
        let activity = SendEmailActivity::new();
        let ctx = ActivityContext::new("cadence-e1", "send-0", 1, 3);

        let first = activity.execute(&ctx, input("Welcome")).await.unwrap();
        let second = activity.execute(&ctx, input("Welcome")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(activity.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_activity_starts_with_empty_record() {
        let ctx = ActivityContext::new("cadence-e1", "send-0", 1, 3);

        let first = SendEmailActivity::new();
        first.execute(&ctx, input("Welcome")).await.unwrap();
        drop(first);

        let second = SendEmailActivity::new();
        assert!(second.outbox().is_empty());
        second.execute(&ctx, input("Welcome")).await.unwrap();
        assert_eq!(second.outbox().len(), 1);
    }

    #[tokio::test]
    async fn test_new_attempt_sends_again() {
        let activity = SendEmailActivity::new();

        activity
            .execute(&ActivityContext::new("cadence-e1", "send-0", 1, 3), input("Welcome"))
            .await
            .unwrap();
        activity
            .execute(&ActivityContext::new("cadence-e1", "send-0", 2, 3), input("Welcome"))
            .await
            .unwrap();

        assert_eq!(activity.outbox().len(), 2);
    }

    #[tokio::test]
    async fn test_forced_failures_are_retryable() {
        let activity = SendEmailActivity::new();
        activity.fail_subject("Welcome", 2);

        for attempt in 1..=2 {
            let ctx = ActivityContext::new("cadence-e1", "send-0", attempt, 3);
            let err = activity.execute(&ctx, input("Welcome")).await.unwrap_err();
            assert!(err.retryable);
            assert_eq!(err.error_type.as_deref(), Some(PROVIDER_UNAVAILABLE));
        }

        let ctx = ActivityContext::new("cadence-e1", "send-0", 3, 3);
        assert!(activity.execute(&ctx, input("Welcome")).await.is_ok());

        // Other subjects are unaffected
        let ctx = ActivityContext::new("cadence-e1", "send-1", 1, 3);
        assert!(activity.execute(&ctx, input("Follow up")).await.is_ok());
    }
}
