use crate::error::DataError;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
}

/// Transient user-facing messages, handed to whoever needs to report something.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Sender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, Receiver<Notice>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(Notice {
            message: message.into(),
            kind: NoticeKind::Info,
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(Notice {
            message: message.into(),
            kind: NoticeKind::Error,
        });
    }

    pub fn data_error(&self, err: DataError) {
        log::info!("reporting {err}");
        self.error(err.user_message());
    }

    fn send(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            log::debug!("notice dropped: no receiver");
        }
    }
}

pub fn drain(rx: &Receiver<Notice>) -> Vec<Notice> {
    rx.try_iter().collect()
}
