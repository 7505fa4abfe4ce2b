//! Single-radio half-duplex multiplexer: bounded transmit/receive queues
//! serviced by one worker thread that balances opportunistic listening
//! against pending transmits.

pub mod config;
pub mod queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::radio::RadioDriver;

pub use config::TransceiverConfig;
pub use queue::ReceivedFrame;
use queue::BoundedQueue;

/// Shared handle to the transceiver; `transmit`/`try_receive` may be called
/// from any thread while the worker thread runs in the background.
pub struct Transceiver {
    radio: Arc<RadioDriver>,
    transmit_queue: Arc<BoundedQueue<Vec<u8>>>,
    receive_queue: Arc<BoundedQueue<ReceivedFrame>>,
    config: Mutex<TransceiverConfig>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    receive_drop_count: std::sync::atomic::AtomicU64,
}

impl Transceiver {
    pub fn new(radio: Arc<RadioDriver>, config: TransceiverConfig) -> Arc<Transceiver> {
        let transceiver = Arc::new(Transceiver {
            radio,
            transmit_queue: Arc::new(BoundedQueue::new(config.transmit_buffer_length_packets)),
            receive_queue: Arc::new(BoundedQueue::new(config.receive_buffer_length_packets)),
            config: Mutex::new(config),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            receive_drop_count: std::sync::atomic::AtomicU64::new(0),
        });
        transceiver.start();
        transceiver
    }

    pub fn configure(&self, config: TransceiverConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn transmit(&self, payload: Vec<u8>) -> Result<()> {
        self.transmit_queue.push(payload)
    }

    pub fn try_receive(&self, timeout: Duration) -> Option<ReceivedFrame> {
        self.receive_queue.pop_wait(timeout)
    }

    pub fn dropped_received_frame_count(&self) -> u64 {
        self.receive_drop_count.load(Ordering::Relaxed)
    }

    fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let handle = std::thread::spawn(move || this.run());
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        let _ = self.radio.standby();
        let _ = self.radio.sleep();
    }

    fn run(self: Arc<Self>) {
        let mut transmit_in_progress = false;

        while self.running.load(Ordering::SeqCst) {
            let config = *self.config.lock().unwrap();
            let poll_interval = Duration::from_millis(config.poll_interval_milliseconds);

            if transmit_in_progress {
                match self
                    .radio
                    .wait_for_transmit(Duration::from_millis(config.transmit_timeout_milliseconds))
                {
                    Ok(()) => {
                        self.transmit_queue.pop();
                        transmit_in_progress = false;
                    }
                    Err(Error::Timeout) => {
                        warn!("transmit timed out, forcing standby");
                        let _ = self.radio.standby();
                        self.transmit_queue.pop();
                        transmit_in_progress = false;
                    }
                    Err(e) => {
                        warn!("transmit wait failed: {}", e);
                        transmit_in_progress = false;
                    }
                }
                continue;
            }

            if let Some(frame) = self.transmit_queue.peek_front() {
                match self.radio.transmit(&frame) {
                    Ok(_) => transmit_in_progress = true,
                    Err(e) => {
                        warn!("transmit failed: {}", e);
                        self.transmit_queue.pop();
                    }
                }
                continue;
            }

            if let Err(e) = self.radio.start_receive(false) {
                warn!("start_receive failed: {}", e);
                std::thread::sleep(poll_interval);
                continue;
            }

            match self
                .radio
                .wait_for_data(Duration::from_millis(config.maximum_receive_time_milliseconds))
            {
                Ok(()) => match self.radio.receive() {
                    Ok(payload) => {
                        let status = self.radio.get_status();
                        let frame = ReceivedFrame {
                            payload,
                            rssi: status.last_packet_rssi,
                            snr: status.last_packet_snr,
                        };
                        if self.receive_queue.push_dropping_oldest(frame) {
                            self.receive_drop_count.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(Error::Crc) => debug!("dropped packet with bad CRC"),
                    Err(e) => warn!("receive failed: {}", e),
                },
                Err(Error::Timeout) => {
                    let _ = self.radio.standby();
                }
                Err(e) => warn!("wait_for_data failed: {}", e),
            }
        }
    }

}
