//! Request/response dispatcher over one open transport.
//!
//! Each dispatcher owns a reader thread (endpoint -> decode -> receive
//! queue) and a writer thread (send queue -> encode -> SET_REPORT), plus
//! the two bounded queues between them and the application. Reports reach
//! the application in exact endpoint arrival order; nothing is re-ordered
//! or filtered.
//!
//! The application side is sequential per transport: one in-flight
//! `send_and_collect` at a time. The exchange lock enforces that.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::events::{DongleEvent, DongleObserver, NullObserver, ReportDirection};
use crate::protocol::report::{HidppErrorCode, HidppMsg, Report, SubId, WireReport};
use crate::transport::{TransportError, UsbTransport};

/// Per-report deadline while collecting responses.
pub const RESPONSE_DEADLINE: Duration = Duration::from_millis(500);

/// Depth of the send and receive queues.
const QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no report within the deadline")]
    Timeout,
    #[error("dispatcher is shut down")]
    Closed,
}

/// Result of one HID++ register exchange. Collected reports are preserved
/// even on failure so higher layers can inspect interleaved notifications.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("USB response timeout")]
    Timeout { collected: Vec<Report> },
    #[error("receiver replied with HID++ error: {code}")]
    Hidpp {
        code: HidppErrorCode,
        collected: Vec<Report>,
    },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ExchangeError {
    /// Reports gathered before the exchange failed.
    pub fn collected(&self) -> &[Report] {
        match self {
            ExchangeError::Timeout { collected } | ExchangeError::Hidpp { collected, .. } => {
                collected
            }
            ExchangeError::Dispatch(_) => &[],
        }
    }
}

struct Queues<R> {
    send_tx: SyncSender<R>,
    recv_rx: Receiver<R>,
}

/// Reader/writer pair multiplexing one transport.
pub struct Dispatcher<R: WireReport> {
    transport: Arc<dyn UsbTransport>,
    // Guards the "issue request, drain until terminal" critical section.
    queues: Mutex<Queues<R>>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl<R: WireReport> Dispatcher<R> {
    pub fn new(transport: Arc<dyn UsbTransport>) -> Self {
        Self::with_observer(transport, Arc::new(NullObserver))
    }

    pub fn with_observer(
        transport: Arc<dyn UsbTransport>,
        observer: Arc<dyn DongleObserver>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (send_tx, send_rx) = mpsc::sync_channel::<R>(QUEUE_DEPTH);
        let (recv_tx, recv_rx) = mpsc::sync_channel::<R>(QUEUE_DEPTH);

        let reader = {
            let transport = Arc::clone(&transport);
            let observer = Arc::clone(&observer);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut buf = [0u8; 32];
                while !stop.load(Ordering::Relaxed) {
                    let n = match transport.poll(&mut buf) {
                        Ok(n) => n,
                        Err(TransportError::PollTimeout) => continue,
                        Err(e) => {
                            debug!(error = %e, "reader loop ends");
                            break;
                        }
                    };
                    observer.on_event(&DongleEvent::Report {
                        direction: ReportDirection::In,
                        raw: buf[..n].to_vec(),
                    });
                    match R::decode(&buf[..n]) {
                        Ok(report) => {
                            // Bounded queue: wait for the application to
                            // drain, but keep the stop flag observable.
                            let mut pending = report;
                            loop {
                                match recv_tx.try_send(pending) {
                                    Ok(()) => break,
                                    Err(TrySendError::Full(report)) => {
                                        if stop.load(Ordering::Relaxed) {
                                            return;
                                        }
                                        pending = report;
                                        std::thread::sleep(Duration::from_millis(5));
                                    }
                                    Err(TrySendError::Disconnected(_)) => return,
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping undecodable report"),
                    }
                }
            })
        };

        let writer = {
            let transport = Arc::clone(&transport);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while let Ok(report) = send_rx.recv() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let raw = report.encode();
                    observer.on_event(&DongleEvent::Report {
                        direction: ReportDirection::Out,
                        raw: raw.clone(),
                    });
                    if let Err(e) = transport.submit(&raw) {
                        warn!(error = %e, "writer loop ends");
                        break;
                    }
                }
            })
        };

        Dispatcher {
            transport,
            queues: Mutex::new(Queues { send_tx, recv_rx }),
            stop,
            reader: Some(reader),
            writer: Some(writer),
        }
    }

    /// Enqueue one outbound report.
    pub fn send(&self, report: R) -> Result<(), DispatchError> {
        let queues = self.queues.lock().unwrap();
        match queues.send_tx.try_send(report) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(report)) => queues
                .send_tx
                .send(report)
                .map_err(|_| DispatchError::Closed),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Closed),
        }
    }

    /// Take the next inbound report, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<R, DispatchError> {
        let queues = self.queues.lock().unwrap();
        match queues.recv_rx.recv_timeout(timeout) {
            Ok(report) => Ok(report),
            Err(RecvTimeoutError::Timeout) => Err(DispatchError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::Closed),
        }
    }

    pub fn product_id(&self) -> u16 {
        self.transport.product_id()
    }
}

impl Dispatcher<Report> {
    /// Send one HID++ request and collect every report until the terminal
    /// response.
    ///
    /// A short frame is used when the parameters fit its 4-byte block. The
    /// exchange ends when a HID++ report arrives with the request's device
    /// id and sub id (request and response sub ids coincide for the
    /// register family), when a 0x8f error whose first parameter echoes the
    /// request sub id arrives, or when the per-report deadline fires.
    /// Unsolicited reports seen on the way are kept, in arrival order.
    pub fn send_and_collect(
        &self,
        device_id: u8,
        sub_id: SubId,
        parameters: &[u8],
    ) -> Result<Vec<Report>, ExchangeError> {
        let request = HidppMsg::request(device_id, sub_id, parameters);
        self.send(Report::Hidpp(request))?;

        let mut collected = Vec::new();
        loop {
            let report = match self.recv_timeout(RESPONSE_DEADLINE) {
                Ok(report) => report,
                Err(DispatchError::Timeout) => {
                    return Err(ExchangeError::Timeout { collected });
                }
                Err(e) => return Err(e.into()),
            };

            let terminal = match &report {
                Report::Hidpp(msg) if msg.device_id == device_id => {
                    if msg.sub_id == sub_id {
                        Some(Ok(()))
                    } else if msg.sub_id == SubId::Error && msg.params[0] == u8::from(sub_id) {
                        Some(Err(HidppErrorCode::from(msg.params[2])))
                    } else {
                        None
                    }
                }
                _ => None,
            };

            collected.push(report);
            match terminal {
                Some(Ok(())) => return Ok(collected),
                Some(Err(code)) => return Err(ExchangeError::Hidpp { code, collected }),
                None => {}
            }
        }
    }
}

impl<R: WireReport> Drop for Dispatcher<R> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.transport.shutdown();
        // Drop the send side so the writer's recv() unblocks.
        {
            let mut queues = self.queues.lock().unwrap();
            let (orphan_tx, _) = mpsc::sync_channel(1);
            queues.send_tx = orphan_tx;
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}
