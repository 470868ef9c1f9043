//! Bounded in-memory message channels.
//!
//! A channel holds message-framed records in arrival order. Sends are
//! all-or-nothing: a batch that would break a limit leaves every channel
//! untouched.

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use dbapi_protocol::frame;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Named FIFO message buffers with channel and per-channel message caps.
#[derive(Debug)]
pub struct ChannelBroker {
    channels: Mutex<BTreeMap<String, Vec<String>>>,
    limits: BrokerConfig,
}

impl ChannelBroker {
    pub fn new(limits: BrokerConfig) -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> BrokerConfig {
        self.limits
    }

    /// Appends a message batch (`[{..};{..}]`) to a channel, creating it on
    /// first use. Returns the number of messages appended.
    pub fn send(&self, channel: &str, batch: &str) -> Result<usize, BrokerError> {
        let messages = frame::split_message_batch(batch)?
            .into_iter()
            .map(|message| -> Result<String, BrokerError> {
                frame::strip_enclosing(message, '{', '}', "message")?;
                Ok(message.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut channels = self.channels.lock();
        let held = match channels.get(channel) {
            Some(existing) => existing.len(),
            None if channels.len() >= self.limits.max_channels => {
                tracing::warn!(channel, "rejected send: channel limit reached");
                return Err(BrokerError::TooManyChannels {
                    max: self.limits.max_channels,
                });
            }
            None => 0,
        };

        if held + messages.len() > self.limits.max_messages_per_channel {
            tracing::warn!(
                channel,
                held,
                incoming = messages.len(),
                "rejected send: message limit reached"
            );
            return Err(BrokerError::TooManyMessages {
                max: self.limits.max_messages_per_channel,
            });
        }

        let count = messages.len();
        channels
            .entry(channel.to_string())
            .or_default()
            .extend(messages);
        tracing::debug!(channel, count, "appended messages");
        Ok(count)
    }

    /// Returns the channel's batch and empties it. Unknown channels yield
    /// an empty batch.
    pub fn read(&self, channel: &str) -> String {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel) {
            Some(messages) => frame::join_message_batch(&std::mem::take(messages)),
            None => frame::join_message_batch::<String>(&[]),
        }
    }

    /// Returns the channel's batch without removing anything.
    pub fn peek(&self, channel: &str) -> String {
        let channels = self.channels.lock();
        match channels.get(channel) {
            Some(messages) => frame::join_message_batch(messages),
            None => frame::join_message_batch::<String>(&[]),
        }
    }

    /// Channel names in sorted order.
    pub fn list(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Removes a channel together with its messages.
    pub fn clear(&self, channel: &str) -> Result<(), BrokerError> {
        match self.channels.lock().remove(channel) {
            Some(messages) => {
                tracing::debug!(channel, dropped = messages.len(), "cleared channel");
                Ok(())
            }
            None => Err(BrokerError::UnknownChannel {
                channel: channel.to_string(),
            }),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Total messages held across all channels.
    pub fn message_count(&self) -> usize {
        self.channels.lock().values().map(Vec::len).sum()
    }
}

impl Default for ChannelBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn batch(range: std::ops::Range<usize>) -> String {
        let messages: Vec<String> = range.map(|i| format!("{{id:{}}}", i)).collect();
        frame::join_message_batch(&messages)
    }

    #[test]
    fn test_send_then_read_clears() {
        let broker = ChannelBroker::default();
        let sent = "[{id:1,name:'Ann',age:30};{id:2,name:'Bo',age:41}]";
        assert_eq!(broker.send("people", sent).unwrap(), 2);

        assert_eq!(broker.read("people"), sent);
        assert_eq!(broker.read("people"), "[]");
        // Reading empties but keeps the channel
        assert_eq!(broker.list(), vec!["people".to_string()]);
    }

    #[test]
    fn test_peek_keeps_messages() {
        let broker = ChannelBroker::default();
        broker.send("jobs", "[{id:1}]").unwrap();
        assert_eq!(broker.peek("jobs"), "[{id:1}]");
        assert_eq!(broker.peek("jobs"), "[{id:1}]");
        assert_eq!(broker.message_count(), 1);
    }

    #[test]
    fn test_appends_preserve_order() {
        let broker = ChannelBroker::default();
        broker.send("jobs", "[{id:1}]").unwrap();
        broker.send("jobs", "[{id:2};{id:3}]").unwrap();
        assert_eq!(broker.read("jobs"), "[{id:1};{id:2};{id:3}]");
    }

    #[test]
    fn test_unknown_channel_reads_empty_without_creating() {
        let broker = ChannelBroker::default();
        assert_eq!(broker.read("missing"), "[]");
        assert_eq!(broker.peek("missing"), "[]");
        assert_eq!(broker.channel_count(), 0);
    }

    #[test]
    fn test_over_cap_batch_rejected_whole() {
        let broker = ChannelBroker::default();
        broker.send("jobs", &batch(0..99)).unwrap();
        let before = broker.peek("jobs");

        let err = broker.send("jobs", &batch(99..101)).unwrap_err();
        assert!(matches!(err, BrokerError::TooManyMessages { max: 100 }));
        assert_eq!(broker.peek("jobs"), before);
        assert_eq!(broker.message_count(), 99);

        // Exactly filling the channel is allowed
        broker.send("jobs", &batch(99..100)).unwrap();
        assert_eq!(broker.message_count(), 100);
    }

    #[test]
    fn test_oversized_first_batch_does_not_create_channel() {
        let broker = ChannelBroker::default();
        assert!(broker.send("jobs", &batch(0..101)).is_err());
        assert_eq!(broker.channel_count(), 0);
    }

    #[test]
    fn test_fifty_first_channel_rejected() {
        let broker = ChannelBroker::default();
        for i in 0..50 {
            broker.send(&format!("ch{}", i), "[{id:1}]").unwrap();
        }

        let err = broker.send("ch50", "[{id:1}]").unwrap_err();
        assert!(matches!(err, BrokerError::TooManyChannels { max: 50 }));
        assert_eq!(broker.channel_count(), 50);

        // Existing channels still accept messages
        broker.send("ch0", "[{id:2}]").unwrap();
    }

    #[test]
    fn test_clear() {
        let broker = ChannelBroker::default();
        broker.send("jobs", "[{id:1}]").unwrap();
        broker.clear("jobs").unwrap();
        assert!(broker.list().is_empty());

        let err = broker.clear("jobs").unwrap_err();
        assert!(matches!(err, BrokerError::UnknownChannel { .. }));
    }

    #[test]
    fn test_invalid_batches() {
        let broker = ChannelBroker::default();
        assert!(matches!(
            broker.send("jobs", "{id:1}"),
            Err(BrokerError::InvalidBatch(_))
        ));
        assert!(matches!(
            broker.send("jobs", "[id:1]"),
            Err(BrokerError::InvalidBatch(_))
        ));
        assert!(broker.list().is_empty());

        // An empty batch is valid and creates the channel
        assert_eq!(broker.send("jobs", "[]").unwrap(), 0);
        assert_eq!(broker.list(), vec!["jobs".to_string()]);
    }

    #[test]
    fn test_quoted_delimiters_stay_in_message() {
        let broker = ChannelBroker::default();
        broker
            .send("notes", "[{id:1,text:'a;b'};{id:2,text:'[x]'}]")
            .unwrap();
        assert_eq!(broker.message_count(), 2);
        assert_eq!(
            broker.peek("notes"),
            "[{id:1,text:'a;b'};{id:2,text:'[x]'}]"
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let broker = ChannelBroker::default();
        broker.send("zeta", "[{id:1}]").unwrap();
        broker.send("alpha", "[{id:1}]").unwrap();
        assert_eq!(broker.list(), vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_concurrent_sends_respect_cap() {
        let broker = Arc::new(ChannelBroker::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broker = broker.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| broker.send("jobs", "[{id:1}]").is_ok())
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 100);
        assert_eq!(broker.message_count(), 100);
    }
}
