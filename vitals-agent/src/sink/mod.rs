//! Outbound notification sinks
//!
//! A sink delivers one message over one channel and reports success or
//! failure. Sinks never retry; the caller logs failures and moves on.

pub mod twilio;

pub use twilio::TwilioSink;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Call,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Call => "call",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Dispatch not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &str;

    async fn send(&self, channel: Channel, message: &str) -> Result<(), DispatchError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl DispatchSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, channel: Channel, message: &str) -> Result<(), DispatchError> {
        info!(channel = %channel, "Dispatch: {}", message);
        Ok(())
    }
}

/// One captured send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: Channel,
    pub message: String,
}

/// Captures every send; can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentMessage>>,
    attempts: Mutex<usize>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully delivered messages, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_on(&self, channel: Channel) -> usize {
        self.sent().iter().filter(|m| m.channel == channel).count()
    }

    /// Send attempts including failed ones
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DispatchSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, channel: Channel, message: &str) -> Result<(), DispatchError> {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Network("recording sink set to fail".to_string()));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                channel,
                message: message.to_string(),
            });
        Ok(())
    }
}
