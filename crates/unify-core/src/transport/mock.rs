//! Mock USB transport for testing.
//!
//! Simulates the receiver's IN endpoint: reports can be queued up front, or
//! produced on the fly by a responder closure that sees every outbound
//! report. `poll` blocks like the real endpoint until a report or shutdown.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

const MOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Endpoint {
    reports: VecDeque<Vec<u8>>,
    closed: bool,
}

pub struct MockTransport {
    endpoint: Mutex<Endpoint>,
    available: Condvar,
    write_log: Mutex<Vec<Vec<u8>>>,
    responder: Mutex<Option<Responder>>,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            endpoint: Mutex::new(Endpoint {
                reports: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            write_log: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            pid: 0xc52b,
        }
    }

    /// Queue one inbound report for a later `poll`.
    pub fn queue_report(&self, raw: &[u8]) {
        let mut ep = self.endpoint.lock().unwrap();
        ep.reports.push_back(raw.to_vec());
        self.available.notify_all();
    }

    /// Install a closure that answers each outbound report with zero or
    /// more inbound ones.
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// All reports submitted so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn submit(&self, report: &[u8]) -> Result<(), TransportError> {
        if self.endpoint.lock().unwrap().closed {
            return Err(TransportError::Closed);
        }
        self.write_log.lock().unwrap().push(report.to_vec());
        let replies = match self.responder.lock().unwrap().as_mut() {
            Some(responder) => responder(report),
            None => Vec::new(),
        };
        if !replies.is_empty() {
            let mut ep = self.endpoint.lock().unwrap();
            ep.reports.extend(replies);
            self.available.notify_all();
        }
        Ok(())
    }

    fn poll(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut ep = self.endpoint.lock().unwrap();
        loop {
            if let Some(report) = ep.reports.pop_front() {
                let n = report.len().min(buf.len());
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
            if ep.closed {
                return Err(TransportError::Closed);
            }
            let (guard, timeout) = self
                .available
                .wait_timeout(ep, MOCK_POLL_INTERVAL)
                .unwrap();
            ep = guard;
            if timeout.timed_out() && ep.reports.is_empty() {
                return if ep.closed {
                    Err(TransportError::Closed)
                } else {
                    Err(TransportError::PollTimeout)
                };
            }
        }
    }

    fn shutdown(&self) {
        self.endpoint.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_reports_come_back_in_order() {
        let mock = MockTransport::new();
        mock.queue_report(&[1, 2, 3]);
        mock.queue_report(&[4, 5]);

        let mut buf = [0u8; 32];
        assert_eq!(mock.poll(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(mock.poll(&mut buf).unwrap(), 2);
        assert!(matches!(
            mock.poll(&mut buf),
            Err(TransportError::PollTimeout)
        ));
    }

    #[test]
    fn responder_answers_writes() {
        let mock = MockTransport::new();
        mock.set_responder(|out| vec![vec![out[0], 0xee]]);
        mock.submit(&[0x42]).unwrap();

        let mut buf = [0u8; 32];
        assert_eq!(mock.poll(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x42, 0xee]);
        assert_eq!(mock.writes(), vec![vec![0x42]]);
    }

    #[test]
    fn shutdown_fails_pending_io() {
        let mock = MockTransport::new();
        mock.shutdown();
        let mut buf = [0u8; 32];
        assert!(matches!(mock.poll(&mut buf), Err(TransportError::Closed)));
        assert!(matches!(mock.submit(&[0]), Err(TransportError::Closed)));
    }
}
