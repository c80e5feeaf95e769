//! Host-facing session loop and transports

use crate::bus::{self, SimulatedBus};
use crate::config::{SerialConfig, Settings, TransportConfig};
use crate::ecu::SimulatedEcu;
use anyhow::Context;
use elm_protocol::{CanBus, CanFrame, Emulator, DIAG_RESPONSE_IDS};
use metrics::{counter, gauge};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Frames queued between bus nodes and the capture task
const BUS_QUEUE: usize = 256;

/// Pending bus notifications for the session loop. Once full, further
/// notifications are dropped, and diagnostic replies among them are not
/// relayed to a host outside monitor mode.
const EVENT_QUEUE: usize = 64;

/// Host read chunk size
const READ_CHUNK: usize = 256;

/// Serve one host until it disconnects.
///
/// Host bytes are fed to the emulator and answered as soon as a line
/// completes. Between commands, bus activity reported on `events` is relayed:
/// the monitor stream while monitoring, diagnostic replies otherwise.
pub async fn run_session<S, B>(
    stream: S,
    emulator: &mut Emulator,
    bus: &mut B,
    events: &mut mpsc::Receiver<CanFrame>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    B: CanBus,
{
    emulator.begin_session();
    // Replies to the previous host are stale
    while events.try_recv().is_ok() {}

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                let response = emulator.feed_bytes(&buf[..n], bus);
                if !response.is_empty() {
                    writer.write_all(response.as_bytes()).await?;
                }
            }
            Some(frame) = events.recv() => {
                if let Some(text) = relay(emulator, &frame) {
                    writer.write_all(text.as_bytes()).await?;
                }
            }
        }
    }
}

/// Text to push to the host for a frame that just appeared on the bus
fn relay(emulator: &mut Emulator, frame: &CanFrame) -> Option<String> {
    if emulator.session().monitor {
        return emulator.relay_monitor();
    }
    if !DIAG_RESPONSE_IDS.contains(&frame.id) {
        return None;
    }
    let mut text = emulator.obd_reply(frame);
    text.push_str(emulator.session().line_ending());
    text.push('>');
    Some(text)
}

/// Wire up the simulated bus and serve hosts on the configured transport
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let (producer, consumer) = ring_buffer::channel(settings.buffers.frame_capacity);
    let mut emulator = Emulator::new(settings.emulator_config(), consumer);

    let (bus_tx, bus_rx) = mpsc::channel(BUS_QUEUE);
    let (event_tx, mut events) = mpsc::channel(EVENT_QUEUE);
    tokio::spawn(bus::run_receiver(bus_rx, producer, event_tx));

    for traffic in settings.bus.traffic.iter().cloned() {
        tokio::spawn(bus::run_traffic(traffic, bus_tx.clone()));
    }

    let mut can = if settings.bus.ecu_enabled {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let ecu = SimulatedEcu::new(settings.bus.ecu_response_id);
        tokio::spawn(ecu.run(request_rx, bus_tx.clone()));
        SimulatedBus::new(request_tx)
    } else {
        SimulatedBus::detached()
    };
    drop(bus_tx);

    match &settings.transport {
        TransportConfig::Tcp(tcp) => {
            serve_tcp(&tcp.listen, &mut emulator, &mut can, &mut events).await
        }
        TransportConfig::Serial(serial) => {
            serve_serial(serial, &mut emulator, &mut can, &mut events).await
        }
    }
}

/// Accept TCP hosts one at a time; later clients wait in the backlog
async fn serve_tcp<B: CanBus>(
    listen: &str,
    emulator: &mut Emulator,
    bus: &mut B,
    events: &mut mpsc::Receiver<CanFrame>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }
        info!("Client connected: {}", peer);
        counter!("elm_sessions_total").increment(1);
        gauge!("elm_clients_connected").set(1.0);

        if let Err(e) = run_session(stream, emulator, bus, events).await {
            warn!("Session with {} failed: {}", peer, e);
        }

        gauge!("elm_clients_connected").set(0.0);
        info!("Client disconnected: {}", peer);
    }
}

/// Serve the single host attached to a serial port
async fn serve_serial<B: CanBus>(
    serial: &SerialConfig,
    emulator: &mut Emulator,
    bus: &mut B,
    events: &mut mpsc::Receiver<CanFrame>,
) -> anyhow::Result<()> {
    let port = tokio_serial::new(&serial.device, serial.baud_rate)
        .open_native_async()
        .with_context(|| format!("Failed to open serial port {}", serial.device))?;
    info!("Serving on {} at {} baud", serial.device, serial.baud_rate);
    counter!("elm_sessions_total").increment(1);

    run_session(port, emulator, bus, events)
        .await
        .with_context(|| format!("Serial session on {} failed", serial.device))
}
