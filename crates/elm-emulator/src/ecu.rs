//! Simulated Engine ECU
//!
//! Answers single-frame mode 01 requests with plausible values so the
//! emulator can be exercised without a vehicle.

use elm_protocol::{mode, CanFrame, Pid, DIAG_BROADCAST_ID, DIAG_REQUEST_ID};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Negative response code: sub-function not supported
const NRC_SUB_FUNCTION_NOT_SUPPORTED: u8 = 0x12;

/// Engine ECU answering OBD-II requests
#[derive(Debug)]
pub struct SimulatedEcu {
    /// Identifier replies are sent from
    response_id: u32,
    /// Requests answered so far, used to vary the values
    tick: u64,
}

impl SimulatedEcu {
    /// Create an ECU replying from `response_id`
    pub fn new(response_id: u32) -> Self {
        Self {
            response_id,
            tick: 0,
        }
    }

    /// Build the reply to a frame seen on the bus, if it is a request this
    /// ECU answers
    pub fn respond(&mut self, request: &CanFrame) -> Option<CanFrame> {
        if request.id != DIAG_REQUEST_ID && request.id != DIAG_BROADCAST_ID {
            return None;
        }

        // Single frame PCI: upper nibble 0, length 1-7
        let length = request.data[0];
        if length == 0 || length > 7 {
            return None;
        }

        let service = request.data[1];
        if service != mode::CURRENT_DATA || length < 2 {
            return Some(self.negative_response(service));
        }

        let pid = request.data[2];
        let value = match Pid::try_from(pid) {
            Ok(known) => self.sample(known),
            Err(_) => return Some(self.negative_response(service)),
        };

        self.tick += 1;
        let mut data = [0u8; 8];
        data[0] = 2 + value.len() as u8;
        data[1] = service + mode::RESPONSE_OFFSET;
        data[2] = pid;
        data[3..3 + value.len()].copy_from_slice(&value);
        Some(CanFrame::with_data(self.response_id, data))
    }

    fn negative_response(&self, service: u8) -> CanFrame {
        CanFrame::with_data(
            self.response_id,
            [
                3,
                mode::NEGATIVE_RESPONSE,
                service,
                NRC_SUB_FUNCTION_NOT_SUPPORTED,
                0,
                0,
                0,
                0,
            ],
        )
    }

    /// Generate encoded data bytes for a PID
    fn sample(&self, pid: Pid) -> Vec<u8> {
        // Deterministic pseudo-random values that change per request
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        pid.hash(&mut hasher);
        let hash = hasher.finish();

        match pid {
            Pid::Supported => supported_bitmap().to_be_bytes().to_vec(),
            // RPM: 800-3500 RPM range
            Pid::Rpm => {
                let rpm = 800 + (hash % 2700) as u16;
                let encoded = rpm * 4;
                vec![(encoded >> 8) as u8, (encoded & 0xFF) as u8]
            }
            // Speed: 0-120 km/h
            Pid::Speed => vec![(hash % 120) as u8],
            // Coolant temp: 70-105°C (stored as value + 40)
            Pid::CoolantTemp => vec![(110 + (hash % 35)) as u8],
            // Engine load: 20-80%
            Pid::EngineLoad => vec![(51 + (hash % 153)) as u8],
            // MAF: 5-50 g/s
            Pid::Maf => {
                let maf = 500 + (hash % 4500) as u16;
                vec![(maf >> 8) as u8, (maf & 0xFF) as u8]
            }
            // Fuel trims: -10% to +10%
            Pid::ShortFuelTrim | Pid::LongFuelTrim => vec![(115 + (hash % 26)) as u8],
            // O2 voltage: 0.1-0.9V, trim byte unused
            Pid::O2Voltage => vec![(20 + (hash % 160)) as u8, 0xFF],
            // Intake manifold pressure: 30-100 kPa
            Pid::IntakeManifoldPressure => vec![(30 + (hash % 70)) as u8],
            // Throttle: 8-47%
            Pid::ThrottlePosition => vec![(20 + (hash % 100)) as u8],
        }
    }

    /// Answer requests until the request channel closes
    pub async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<CanFrame>,
        bus: mpsc::Sender<CanFrame>,
    ) {
        info!("Simulated ECU answering from {:03X}", self.response_id);

        while let Some(request) = requests.recv().await {
            let Some(reply) = self.respond(&request) else {
                debug!("ECU ignoring frame {:03X}", request.id);
                continue;
            };
            if bus.send(reply).await.is_err() {
                debug!("Bus receiver dropped, stopping ECU");
                break;
            }
        }
    }
}

/// Supported PIDs 01-20 as the 32-bit mask returned for PID 00
fn supported_bitmap() -> u32 {
    Pid::ALL
        .iter()
        .map(|pid| pid.as_hex())
        .filter(|&pid| (0x01..=0x20).contains(&pid))
        .fold(0u32, |mask, pid| mask | 1 << (0x20 - pid as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use elm_protocol::PidRequest;

    fn request(mode: u8, pid: u8) -> CanFrame {
        PidRequest { mode, pid }.to_frame()
    }

    #[test]
    fn test_coolant_reply() {
        let mut ecu = SimulatedEcu::new(0x7E8);
        let reply = ecu.respond(&request(0x01, 0x05)).unwrap();
        assert_eq!(reply.id, 0x7E8);
        assert_eq!(&reply.data[..3], &[0x03, 0x41, 0x05]);
        assert!((110..145).contains(&reply.data[3]));
    }

    #[test]
    fn test_rpm_reply_in_range() {
        let mut ecu = SimulatedEcu::new(0x7E8);
        for _ in 0..20 {
            let reply = ecu.respond(&request(0x01, 0x0C)).unwrap();
            assert_eq!(reply.data[0], 4);
            let rpm = ((reply.data[3] as u32) << 8 | reply.data[4] as u32) / 4;
            assert!((800..3500).contains(&rpm));
        }
    }

    #[test]
    fn test_supported_bitmap() {
        let mut ecu = SimulatedEcu::new(0x7E8);
        let reply = ecu.respond(&request(0x01, 0x00)).unwrap();
        assert_eq!(reply.data[0], 6);
        let mask = u32::from_be_bytes([reply.data[3], reply.data[4], reply.data[5], reply.data[6]]);
        // PID 0x0C is bit 20 counting from the least significant end
        assert_ne!(mask & (1 << (0x20 - 0x0C)), 0);
        assert_eq!(mask & (1 << (0x20 - 0x01)), 0);
    }

    #[test]
    fn test_negative_responses() {
        let mut ecu = SimulatedEcu::new(0x7E8);
        let reply = ecu.respond(&request(0x01, 0x42)).unwrap();
        assert_eq!(&reply.data[..4], &[0x03, 0x7F, 0x01, 0x12]);

        let reply = ecu.respond(&request(0x09, 0x02)).unwrap();
        assert_eq!(&reply.data[..4], &[0x03, 0x7F, 0x09, 0x12]);
    }

    #[test]
    fn test_ignores_other_traffic() {
        let mut ecu = SimulatedEcu::new(0x7E8);
        assert!(ecu.respond(&CanFrame::new(0x100, &[2, 1, 5]).unwrap()).is_none());
        assert!(ecu.respond(&CanFrame::new(0x7E0, &[0x10, 0x14, 0x49]).unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_run_forwards_replies() {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (bus_tx, mut bus_rx) = mpsc::channel(4);
        let task = tokio::spawn(SimulatedEcu::new(0x7E8).run(req_rx, bus_tx));

        req_tx.send(request(0x01, 0x0D)).unwrap();
        let reply = bus_rx.recv().await.unwrap();
        assert_eq!(&reply.data[..3], &[0x03, 0x41, 0x0D]);

        drop(req_tx);
        task.await.unwrap();
    }
}
