//! Topic-keyed fan-out of reassembled stream payloads to application
//! listeners. Delivery is synchronous and best-effort; a listener
//! that needs to keep the data must copy it before returning.

use std::sync::{Arc, Mutex};

pub trait Listener: Send + Sync {
    fn on_payload(&self, port: u16, stream_id: u16, data: &[u8]);
}

impl<F> Listener for F
where
    F: Fn(u16, u16, &[u8]) + Send + Sync,
{
    fn on_payload(&self, port: u16, stream_id: u16, data: &[u8]) {
        self(port, stream_id, data)
    }
}

struct Registration {
    port: Option<u16>,
    listener: Arc<dyn Listener>,
}

#[derive(Default)]
pub struct EventBus {
    registrations: Mutex<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus {
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener for a specific port.
    pub fn subscribe(&self, port: u16, listener: impl Listener + 'static) {
        self.registrations.lock().unwrap().push(Registration {
            port: Some(port),
            listener: Arc::new(listener),
        });
    }

    /// Registers a listener for every port.
    pub fn subscribe_all(&self, listener: impl Listener + 'static) {
        self.registrations.lock().unwrap().push(Registration {
            port: None,
            listener: Arc::new(listener),
        });
    }

    pub fn publish(&self, port: u16, stream_id: u16, data: &[u8]) {
        // The registry lock is held only to snapshot matching listeners,
        // not across delivery, so a slow listener only slows this publish
        // call, not other streams' publish calls.
        let matching: Vec<Arc<dyn Listener>> = self
            .registrations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.port.is_none() || r.port == Some(port))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in matching {
            listener.on_payload(port, stream_id, data);
        }
    }
}
