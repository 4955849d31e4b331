// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Line timing channels and the port that drives them.
//!
//! Each channel is one PIO state machine. Its identity is fixed when the set is built; the
//! engine never works out which machine it is talking to from anything else.
//!
//! | Block | SM | Channel |
//! | ----- | -- | ------- |
//! | PIO0 | 0 | `Start` |
//! | PIO0 | 1 | `TxBlink` |
//! | PIO0 | 2 | `TxBuffer` |
//! | PIO0 | 3 | `TxEncode` |
//! | PIO1 | 0 | `TxEcho` |
//! | PIO1 | 1 | `RxSync` |
//! | PIO1 | 2 | `RxDecode` |

use heapless::Vec;

/// How the TX channels are released.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartTrigger {
    /// Immediately.
    Auto,
    /// On the next edge of the decoded RX stream.
    FromRx,
}

/// Where the RX decoder listens.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RxSource {
    #[default]
    External,
    /// Our own TX output.
    Loopback,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Start(StartTrigger),
    /// LED and blink timing, one word pair per frame.
    TxBlink,
    /// LTC bit queue, feeds the encoder.
    TxBuffer,
    /// Biphase-mark line encoder.
    TxEncode,
    /// Raw value of each frame sent, read back by the blink IRQ.
    TxEcho,
    /// Sync word search and data capture.
    RxSync,
    /// Biphase-mark line decoder.
    RxDecode(RxSource),
}

impl ChannelKind {
    pub fn is_rx(self) -> bool {
        matches!(self, ChannelKind::RxSync | ChannelKind::RxDecode(_))
    }
}

/// A channel and the state machine it runs on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub kind: ChannelKind,
    pub block: u8,
    pub sm: u8,
}

impl Channel {
    const fn new(kind: ChannelKind, block: u8, sm: u8) -> Self {
        Self { kind, block, sm }
    }
}

/// Session modes a channel set is built for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Free-run TX only.
    #[default]
    Run,
    /// TX plus RX decode.
    Monitor,
    /// Hold TX until locked to RX.
    Jam,
}

/// The channels of one session.
#[derive(Clone, Debug)]
pub struct ChannelSet {
    channels: Vec<Channel, 7>,
}

impl ChannelSet {
    /// Build the channels needed for a session. Jam always decodes the external input, since
    /// there is no TX output to loop back until it locks.
    pub fn for_mode(mode: StartMode, rx: RxSource) -> Self {
        let trigger = match mode {
            StartMode::Jam => StartTrigger::FromRx,
            _ => StartTrigger::Auto,
        };

        let mut channels = Vec::new();
        let tx = [
            Channel::new(ChannelKind::Start(trigger), 0, 0),
            Channel::new(ChannelKind::TxBlink, 0, 1),
            Channel::new(ChannelKind::TxBuffer, 0, 2),
            Channel::new(ChannelKind::TxEncode, 0, 3),
            Channel::new(ChannelKind::TxEcho, 1, 0),
        ];
        // 7 slots hold every channel
        let _ = channels.extend_from_slice(&tx);

        match mode {
            StartMode::Run => {}
            StartMode::Monitor | StartMode::Jam => {
                let source = if mode == StartMode::Jam {
                    RxSource::External
                } else {
                    rx
                };
                let _ = channels.push(Channel::new(ChannelKind::RxSync, 1, 1));
                let _ = channels.push(Channel::new(ChannelKind::RxDecode(source), 1, 2));
            }
        }
        Self { channels }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    fn find(&self, f: impl Fn(ChannelKind) -> bool) -> Option<Channel> {
        self.channels.iter().copied().find(|c| f(c.kind))
    }

    pub fn start(&self) -> Option<Channel> {
        self.find(|k| matches!(k, ChannelKind::Start(_)))
    }

    pub fn blink(&self) -> Option<Channel> {
        self.find(|k| k == ChannelKind::TxBlink)
    }

    pub fn buffer(&self) -> Option<Channel> {
        self.find(|k| k == ChannelKind::TxBuffer)
    }

    pub fn echo(&self) -> Option<Channel> {
        self.find(|k| k == ChannelKind::TxEcho)
    }

    pub fn sync(&self) -> Option<Channel> {
        self.find(|k| k == ChannelKind::RxSync)
    }

    pub fn has_rx(&self) -> bool {
        self.channels.iter().any(|c| c.kind.is_rx())
    }
}

/// Word queues and enables of the line state machines.
pub trait LinePort {
    /// Words waiting in the channel's TX queue.
    fn tx_level(&self, ch: &Channel) -> usize;

    /// Words waiting in the channel's RX queue.
    fn rx_level(&self, ch: &Channel) -> usize;

    /// Queue a word, waiting for space if the queue is full.
    fn push(&mut self, ch: &Channel, word: u32);

    fn pop(&mut self, ch: &Channel) -> Option<u32>;

    fn set_enabled(&mut self, ch: &Channel, enabled: bool);

    /// Drive the line outputs and LEDs low.
    fn park(&mut self);
}
