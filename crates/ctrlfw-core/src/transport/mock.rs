//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Identity, TickFlags, Transport, TransportError};
use crate::protocol::{CallbackPacket, Request, Response};

/// Scripted outcome for the next request that expects a response.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Response arrives before the deadline.
    Response(Response),
    /// Nothing arrives before the deadline.
    Timeout,
    /// Response lands in the same poll that hits the deadline.
    LateResponse(Response),
    /// Transport fails while sending.
    Error(TransportError),
    /// Send completes, then the finish phase runs into the deadline.
    FinishTimeout,
}

/// Mock transport for unit testing engine logic.
///
/// Clones share state, so a test can keep one handle while the device owns another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    identity: Option<Identity>,
    /// Queued replies for response-expected requests.
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    /// Captured requests.
    sent: Arc<Mutex<Vec<Request>>>,
    /// Queued callback packets.
    callbacks: Arc<Mutex<VecDeque<CallbackPacket>>>,
    /// Response waiting to be taken.
    pending: Arc<Mutex<Option<Response>>>,
    /// Simulated microsecond clock.
    clock_us: Arc<Mutex<u64>>,
    /// Simulated time per exchange.
    latency_us: u64,
    finishes: Arc<Mutex<usize>>,
    /// Next finish hits the deadline.
    finish_times_out: Arc<Mutex<bool>>,
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new(device_identifier: u16) -> Self {
        Self::with_identity(Some(Identity {
            uid: "Xyz".to_string(),
            device_identifier,
        }))
    }

    /// Endpoint with nothing attached behind it.
    pub fn detached() -> Self {
        Self::with_identity(None)
    }

    fn with_identity(identity: Option<Identity>) -> Self {
        Self {
            identity,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(Mutex::new(VecDeque::new())),
            pending: Arc::new(Mutex::new(None)),
            clock_us: Arc::new(Mutex::new(0)),
            latency_us: 250,
            finishes: Arc::new(Mutex::new(0)),
            finish_times_out: Arc::new(Mutex::new(false)),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a scripted reply.
    pub fn queue_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Queue a successful response carrying `payload`.
    pub fn queue_response(&self, payload: &[u8]) {
        self.queue_reply(MockReply::Response(Response::ok(payload)));
    }

    /// Queue a response carrying a device error code.
    pub fn queue_error_code(&self, error_code: u8) {
        self.queue_reply(MockReply::Response(Response::error(error_code)));
    }

    /// Queue a callback packet for the next callback tick.
    pub fn queue_callback(&self, function_id: u8, payload: &[u8]) {
        self.callbacks.lock().unwrap().push_back(CallbackPacket {
            function_id,
            payload: payload.to_vec(),
        });
    }

    /// Get all captured requests.
    pub fn sent_requests(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }

    /// Clear captured requests.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Number of times the in-flight slot was released.
    pub fn finish_count(&self) -> usize {
        *self.finishes.lock().unwrap()
    }

    pub fn advance_clock(&self, us: u64) {
        *self.clock_us.lock().unwrap() += us;
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn run_until(&self, deadline_us: u64) {
        let mut clock = self.clock_us.lock().unwrap();
        *clock = (*clock).max(deadline_us);
    }
}

impl Transport for MockTransport {
    fn identity(&self) -> Option<Identity> {
        self.identity.clone()
    }

    fn now_us(&self) -> u64 {
        *self.clock_us.lock().unwrap()
    }

    fn send_packet(
        &mut self,
        request: &Request,
        deadline_us: u64,
    ) -> Result<TickFlags, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.sent.lock().unwrap().push(request.clone());
        self.advance_clock(self.latency_us);

        if !request.response_expected {
            return Ok(TickFlags::empty());
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Response(response)) => {
                *self.pending.lock().unwrap() = Some(response);
                Ok(TickFlags::PACKET_RECEIVED)
            }
            Some(MockReply::LateResponse(response)) => {
                *self.pending.lock().unwrap() = Some(response);
                self.run_until(deadline_us);
                Ok(TickFlags::TIMEOUT | TickFlags::PACKET_RECEIVED)
            }
            Some(MockReply::Timeout) | None => {
                self.run_until(deadline_us);
                Ok(TickFlags::TIMEOUT)
            }
            Some(MockReply::Error(e)) => Err(e),
            Some(MockReply::FinishTimeout) => {
                *self.finish_times_out.lock().unwrap() = true;
                Ok(TickFlags::empty())
            }
        }
    }

    fn take_response(&mut self) -> Option<Response> {
        self.pending.lock().unwrap().take()
    }

    fn finish_send(
        &mut self,
        tick: TickFlags,
        deadline_us: u64,
    ) -> Result<TickFlags, TransportError> {
        *self.finishes.lock().unwrap() += 1;
        let timed_out = std::mem::take(&mut *self.finish_times_out.lock().unwrap());
        if timed_out {
            self.run_until(deadline_us);
            return Ok(tick | TickFlags::TIMEOUT);
        }
        Ok(tick)
    }

    fn poll_callback(
        &mut self,
        deadline_us: u64,
    ) -> Result<Option<CallbackPacket>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let packet = self.callbacks.lock().unwrap().pop_front();
        if packet.is_none() {
            self.run_until(deadline_us);
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reply_queue() {
        let mut mock = MockTransport::new(2101);
        mock.queue_response(&[1, 2, 3, 4]);

        let request = Request::new(1, &[], true).unwrap();
        let tick = mock.send_packet(&request, 1_000).unwrap();
        assert!(tick.packet_received());
        assert_eq!(mock.take_response().unwrap().payload, vec![1, 2, 3, 4]);

        // Queue is empty now
        let tick = mock.send_packet(&request, 1_000).unwrap();
        assert!(tick.timed_out());
        assert!(mock.now_us() >= 1_000);
    }

    #[test]
    fn test_mock_request_capture() {
        let mut mock = MockTransport::new(2101);
        let request = Request::new(9, &[0xAA], false).unwrap();
        let tick = mock.send_packet(&request, 1_000).unwrap();
        assert_eq!(tick, TickFlags::empty());

        let sent = mock.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].function_id, 9);
        assert_eq!(sent[0].payload, vec![0xAA]);

        mock.clear_sent();
        assert!(mock.sent_requests().is_empty());
    }

    #[test]
    fn test_mock_finish_timeout() {
        let mut mock = MockTransport::new(2101);
        mock.queue_reply(MockReply::FinishTimeout);

        let request = Request::new(1, &[], true).unwrap();
        let tick = mock.send_packet(&request, 1_000).unwrap();
        assert_eq!(tick, TickFlags::empty());
        assert!(mock.finish_send(tick, 1_000).unwrap().timed_out());
        assert_eq!(mock.now_us(), 1_000);
        // Only the scripted finish times out.
        assert!(!mock.finish_send(tick, 2_000).unwrap().timed_out());
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new(2101);
        mock.disconnect();
        let request = Request::new(1, &[], true).unwrap();
        assert_eq!(
            mock.send_packet(&request, 1_000),
            Err(TransportError::Disconnected)
        );
        mock.reconnect();
        assert!(mock.send_packet(&request, 1_000).is_ok());
    }
}
