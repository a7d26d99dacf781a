use std::{fmt, sync::Arc};

use crate::types::DataSpec;

/// Observer of byte transfers.
///
/// Callbacks arrive in order `initializing`, `start`, zero or more
/// `bytes_transferred`, then `end`, for every transfer that reaches `start`.
/// They run on the loading worker and must not block.
pub trait TransferListener: Send + Sync {
    fn on_transfer_initializing(&self, _spec: &DataSpec, _is_network: bool) {}

    fn on_transfer_start(&self, _spec: &DataSpec, _is_network: bool) {}

    fn on_bytes_transferred(&self, _spec: &DataSpec, _is_network: bool, _bytes: usize) {}

    fn on_transfer_end(&self, _spec: &DataSpec, _is_network: bool) {}
}

/// Fan-out to several listeners.
#[derive(Clone, Default)]
pub struct TransferListeners {
    inner: Vec<Arc<dyn TransferListener>>,
}

impl TransferListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, listener: Arc<dyn TransferListener>) {
        self.inner.push(listener);
    }

    pub fn with(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.push(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for TransferListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferListeners")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl TransferListener for TransferListeners {
    fn on_transfer_initializing(&self, spec: &DataSpec, is_network: bool) {
        for l in &self.inner {
            l.on_transfer_initializing(spec, is_network);
        }
    }

    fn on_transfer_start(&self, spec: &DataSpec, is_network: bool) {
        for l in &self.inner {
            l.on_transfer_start(spec, is_network);
        }
    }

    fn on_bytes_transferred(&self, spec: &DataSpec, is_network: bool, bytes: usize) {
        for l in &self.inner {
            l.on_bytes_transferred(spec, is_network, bytes);
        }
    }

    fn on_transfer_end(&self, spec: &DataSpec, is_network: bool) {
        for l in &self.inner {
            l.on_transfer_end(spec, is_network);
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use url::Url;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl TransferListener for Recorder {
        fn on_transfer_start(&self, _spec: &DataSpec, is_network: bool) {
            self.calls.lock().push(format!("start:{is_network}"));
        }

        fn on_bytes_transferred(&self, _spec: &DataSpec, _is_network: bool, bytes: usize) {
            self.calls.lock().push(format!("bytes:{bytes}"));
        }

        fn on_transfer_end(&self, _spec: &DataSpec, _is_network: bool) {
            self.calls.lock().push("end".into());
        }
    }

    #[test]
    fn fan_out_reaches_every_listener_in_order() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let listeners = TransferListeners::new()
            .with(a.clone() as Arc<dyn TransferListener>)
            .with(b.clone() as Arc<dyn TransferListener>);
        assert_eq!(listeners.len(), 2);

        let spec = DataSpec::new(Url::parse("http://cdn.test/a").unwrap());
        listeners.on_transfer_initializing(&spec, true);
        listeners.on_transfer_start(&spec, true);
        listeners.on_bytes_transferred(&spec, true, 42);
        listeners.on_transfer_end(&spec, true);

        let expected = vec!["start:true", "bytes:42", "end"];
        assert_eq!(*a.calls.lock(), expected);
        assert_eq!(*b.calls.lock(), expected);
    }
}
