//! Email delivery worker for the notification pipeline.
//!
//! Consumes delivery jobs from the email topic and drives SMTP delivery
//! under a dedicated circuit breaker and a budgeted retry loop, posting a
//! status callback to the orchestrator on every terminal outcome. Poison
//! messages are logged and skipped so the topic never wedges.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callback;
pub mod error;
pub mod processor;
pub mod sender;
pub mod worker;

pub use callback::{HttpStatusReporter, StatusReporter};
pub use error::{DeliveryError, Result};
pub use processor::{EmailProcessor, ProcessOutcome, ProcessorConfig};
pub use sender::{EmailMessage, EmailSender, SmtpConfig, SmtpSender};
pub use worker::EmailWorker;
