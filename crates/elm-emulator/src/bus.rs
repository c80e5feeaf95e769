//! Simulated CAN bus
//!
//! Frames the emulator transmits go to the simulated ECU. Everything the ECU
//! and the traffic generators put on the bus is captured into the ring
//! buffer and announced to the session loop.

use crate::config::TrafficFrame;
use elm_protocol::{CanBus, CanFrame, ElmError, FrameProducer};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Transmit side of the simulated bus
#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    requests: Option<mpsc::UnboundedSender<CanFrame>>,
}

impl SimulatedBus {
    /// A bus delivering transmitted frames to `requests`
    pub fn new(requests: mpsc::UnboundedSender<CanFrame>) -> Self {
        Self {
            requests: Some(requests),
        }
    }

    /// A bus with no other nodes attached
    pub fn detached() -> Self {
        Self::default()
    }
}

impl CanBus for SimulatedBus {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ElmError> {
        let Some(requests) = &self.requests else {
            debug!("No node attached, frame {:03X} not acknowledged", frame.id);
            return Ok(());
        };
        requests
            .send(*frame)
            .map_err(|_| ElmError::CanBusError("simulated ECU has stopped".to_string()))
    }
}

/// Put `traffic.frame` on the bus every `traffic.interval_ms` until the bus
/// closes
pub async fn run_traffic(traffic: TrafficFrame, bus: mpsc::Sender<CanFrame>) {
    info!(
        "Broadcasting {:03X} every {}ms",
        traffic.frame.id, traffic.interval_ms
    );
    let mut ticker = interval(Duration::from_millis(traffic.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if bus.send(traffic.frame).await.is_err() {
            debug!("Bus closed, stopping traffic {:03X}", traffic.frame.id);
            break;
        }
    }
}

/// Capture every frame seen on the bus and notify the session loop.
///
/// Capture never blocks: a full ring buffer drops the newest frame, and a
/// slow session loop misses notifications rather than stalling the bus. A
/// missed notification for a diagnostic reply is never relayed outside
/// monitor mode; in monitor mode the frame still goes out with the next drain.
pub async fn run_receiver(
    mut bus: mpsc::Receiver<CanFrame>,
    mut producer: FrameProducer,
    events: mpsc::Sender<CanFrame>,
) {
    while let Some(frame) = bus.recv().await {
        trace!("Bus frame {:03X} {:02X?}", frame.id, frame.payload());
        match producer.push(frame) {
            Ok(()) => counter!("elm_frames_captured_total").increment(1),
            Err(_) => counter!("elm_frames_dropped_total").increment(1),
        }
        if let Err(e) = events.try_send(frame) {
            counter!("elm_notifications_dropped_total").increment(1);
            debug!("Notification for {:03X} not delivered: {}", frame.id, e);
        }
    }
    debug!("Bus receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring_buffer::channel;

    #[test]
    fn test_detached_bus_accepts_frames() {
        let mut bus = SimulatedBus::detached();
        assert!(bus.send_frame(&CanFrame::new(0x7E0, &[2, 1, 5]).unwrap()).is_ok());
    }

    #[test]
    fn test_stopped_ecu_is_a_bus_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut bus = SimulatedBus::new(tx);
        let err = bus
            .send_frame(&CanFrame::new(0x7E0, &[2, 1, 5]).unwrap())
            .unwrap_err();
        assert!(matches!(err, ElmError::CanBusError(_)));
    }

    #[tokio::test]
    async fn test_receiver_captures_and_notifies() {
        let (producer, mut consumer) = channel(4);
        let (bus_tx, bus_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_receiver(bus_rx, producer, event_tx));

        for id in 1..=5u32 {
            bus_tx.send(CanFrame::new(id, &[id as u8]).unwrap()).await.unwrap();
        }
        drop(bus_tx);
        task.await.unwrap();

        // Capacity 4 keeps three frames, every frame is still announced
        let captured: Vec<u32> = consumer.drain().map(|f| f.id).collect();
        assert_eq!(captured, vec![1, 2, 3]);
        assert_eq!(consumer.dropped(), 2);

        let mut announced = Vec::new();
        while let Ok(frame) = event_rx.try_recv() {
            announced.push(frame.id);
        }
        assert_eq!(announced, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_full_event_queue_still_captures() {
        let (producer, mut consumer) = channel(8);
        let (bus_tx, bus_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let task = tokio::spawn(run_receiver(bus_rx, producer, event_tx));

        for id in 0x7E8..=0x7EAu32 {
            bus_tx.send(CanFrame::new(id, &[3, 0x41, 0x0D, 0]).unwrap()).await.unwrap();
        }
        drop(bus_tx);
        task.await.unwrap();

        // Only the first notification fits, capture keeps all three
        assert_eq!(event_rx.try_recv().unwrap().id, 0x7E8);
        assert!(event_rx.try_recv().is_err());
        let captured: Vec<u32> = consumer.drain().map(|f| f.id).collect();
        assert_eq!(captured, vec![0x7E8, 0x7E9, 0x7EA]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_repeats_on_interval() {
        let (bus_tx, mut bus_rx) = mpsc::channel(8);
        let traffic = TrafficFrame {
            frame: CanFrame::new(0x3E9, &[0xAB]).unwrap(),
            interval_ms: 100,
        };
        let task = tokio::spawn(run_traffic(traffic, bus_tx));

        for _ in 0..3 {
            let frame = bus_rx.recv().await.unwrap();
            assert_eq!(frame.id, 0x3E9);
            assert_eq!(frame.payload(), &[0xAB]);
        }

        drop(bus_rx);
        task.await.unwrap();
    }
}
