//! UDP session lifecycle: discovery, the receive loop, the bounded
//! routing channel, and the fixed-cadence request transmitter.
//!
//! One socket serves both directions, so the device can reply to the
//! address its requests come from. The receive loop polls its stop flag
//! between short socket timeouts; stop latency is bounded by
//! `socket_timeout_ms`.

use crate::config::PipelineConfig;
use crate::net::wifi;
use crate::prelude::{RawDatagram, SessionError, SessionMode, SessionResult};
use crate::record::{csv_columns, CsvRecorder};
use crate::router::{FrameRouter, RouteOutcome};
use crate::session::SessionHandle;
use crate::telemetry::LinkMetrics;
use log::{debug, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tokio::time::{interval, timeout};

/// Microseconds since the epoch, wrapped to nine digits to match the
/// device timestamp convention.
pub fn timestamp_us() -> i64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    (micros % 1_000_000_000) as i64
}

#[derive(Clone)]
pub struct NetworkManager {
    config: Arc<PipelineConfig>,
    session: SessionHandle,
    router: Arc<FrameRouter>,
    metrics: Arc<LinkMetrics>,
}

impl NetworkManager {
    pub fn new(
        config: Arc<PipelineConfig>,
        session: SessionHandle,
        router: Arc<FrameRouter>,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        if let Some(ip) = config
            .network
            .device_ip
            .as_deref()
            .and_then(|ip| ip.parse::<IpAddr>().ok())
        {
            session.set_device_ip(ip);
        }
        Self {
            config,
            session,
            router,
            metrics,
        }
    }

    /// Starts a capture session: gates, discovery, socket, and the
    /// three tasks (receive loop, routing worker, transmitter). Any
    /// failure after `begin` rolls the session back to idle.
    pub async fn start(&self, mode: SessionMode) -> SessionResult<()> {
        self.session.begin(mode)?;
        match self.start_inner(mode).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.session.end();
                self.router.end_session();
                Err(err)
            }
        }
    }

    async fn start_inner(&self, mode: SessionMode) -> SessionResult<()> {
        let net = &self.config.network;
        self.check_access_point().await?;
        let device_ip = self.ensure_device().await?;
        let device_addr = SocketAddr::new(device_ip, net.request_port);

        let recorder: Option<Box<dyn crate::record::RecordSink>> = match mode {
            SessionMode::Recording => {
                let columns = csv_columns(self.config.rdm.doppler_rows);
                let recorder = CsvRecorder::create(
                    &self.config.record.csv_directory,
                    &self.config.record.csv_file_prefix,
                    &columns,
                )
                .map_err(|err| SessionError::RecordSink(err.to_string()))?;
                info!("recording to {}", recorder.path().display());
                Some(Box::new(recorder))
            }
            _ => None,
        };
        self.router.begin_session(recorder);
        self.metrics.reset();

        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", net.listen_port)).await?);
        info!(
            "capture session ({mode:?}) on {}, device {device_addr}",
            socket.local_addr()?
        );

        let (frame_tx, frame_rx) = mpsc::channel::<RawDatagram>(net.worker_channel_depth);

        self.session.set_listening(true);
        self.session.set_transmitting(true);
        self.spawn_receive_loop(socket.clone(), frame_tx);
        self.spawn_routing_worker(frame_rx);
        self.spawn_transmitter(socket, device_addr, mode);
        Ok(())
    }

    /// Ends the running session and tells the device to stop streaming.
    pub async fn stop(&self) -> SessionResult<()> {
        self.session.end()?;
        self.finish_session().await;
        Ok(())
    }

    async fn finish_session(&self) {
        if let Some(ip) = self.session.device_ip() {
            let addr = SocketAddr::new(ip, self.config.network.request_port);
            if let Err(err) = send_once(addr, self.config.network.stop_request_payload.as_bytes()).await {
                warn!("stop request to {addr} failed: {err}");
            }
        }
        self.router.end_session();
        // Both loops poll their stop flags at most one timeout or
        // interval apart; wait that long so no straggling send or
        // receive lands after the counter reset.
        let net = &self.config.network;
        let drain_ms = net
            .socket_timeout_ms
            .max(net.monitor_interval_ms)
            .max(net.record_interval_ms);
        tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        let (tx, rx) = self.metrics.snapshot();
        info!(
            "session ended: {tx} requests, {rx} replies, {:.1}% loss",
            self.metrics.packet_loss() * 100.0
        );
        self.metrics.reset();
    }

    pub fn packet_loss(&self) -> f64 {
        self.metrics.packet_loss()
    }

    /// Wi-Fi association gate. Disabled when no SSID is configured.
    async fn check_access_point(&self) -> SessionResult<()> {
        let expected = self.config.network.ap_ssid.clone();
        if expected.is_empty() {
            return Ok(());
        }
        let current = spawn_blocking(wifi::current_ssid)
            .await
            .unwrap_or_default();
        match current {
            Some(ssid) if ssid == expected => Ok(()),
            _ => Err(SessionError::ApNotConnected(expected)),
        }
    }

    /// Resolves the device address: reuse the known one if it still
    /// answers, otherwise rediscover over broadcast.
    pub async fn ensure_device(&self) -> SessionResult<IpAddr> {
        if let Some(ip) = self.session.device_ip() {
            // Probes are part of the association gate; loopback and
            // wired rigs run with it disabled.
            if self.config.network.ap_ssid.is_empty() {
                return Ok(ip);
            }
            let reachable = spawn_blocking(move || wifi::ping_once(ip))
                .await
                .unwrap_or(false);
            if reachable {
                return Ok(ip);
            }
            debug!("device {ip} unreachable; rediscovering");
            let addr = SocketAddr::new(ip, self.config.network.request_port);
            let _ = send_once(addr, self.config.network.reconnect_payload.as_bytes()).await;
            self.session.clear_device_ip();
        }
        self.discover_device().await
    }

    /// Broadcasts the discovery payload and waits for any reply; the
    /// reply's source address is the device.
    pub async fn discover_device(&self) -> SessionResult<IpAddr> {
        let net = &self.config.network;
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.set_broadcast(true)?;
        let target = (net.broadcast_ip.as_str(), net.request_port);

        let mut buf = vec![0u8; net.recv_buffer_size];
        for attempt in 1..=net.discovery_retries {
            socket.send_to(net.discovery_payload.as_bytes(), target).await?;
            match timeout(
                Duration::from_millis(net.discovery_interval_ms),
                socket.recv_from(&mut buf),
            )
            .await
            {
                Ok(Ok((_, from))) => {
                    info!("device discovered at {} (attempt {attempt})", from.ip());
                    self.session.set_device_ip(from.ip());
                    return Ok(from.ip());
                }
                Ok(Err(err)) => return Err(SessionError::Socket(err)),
                Err(_) => debug!("discovery attempt {attempt} timed out"),
            }
        }
        Err(SessionError::DeviceUnreachable {
            attempts: net.discovery_retries,
        })
    }

    fn spawn_receive_loop(&self, socket: Arc<UdpSocket>, frame_tx: mpsc::Sender<RawDatagram>) {
        let session = self.session.clone();
        let metrics = self.metrics.clone();
        let recv_timeout = Duration::from_millis(self.config.network.socket_timeout_ms);
        let buffer_size = self.config.network.recv_buffer_size;
        tokio::spawn(async move {
            let mut buf = vec![0u8; buffer_size];
            while session.is_listening() {
                match timeout(recv_timeout, socket.recv_from(&mut buf)).await {
                    Ok(Ok((len, _from))) => {
                        // Receipt is counted here so loss accounting is
                        // unaffected by load shedding below.
                        metrics.record_rx();
                        let datagram = RawDatagram {
                            payload: buf[..len].to_vec(),
                            received_at_us: timestamp_us(),
                        };
                        // Never block the socket on a slow worker;
                        // shed load here instead.
                        if frame_tx.try_send(datagram).is_err() {
                            warn!("routing channel full; dropping datagram");
                        }
                    }
                    Ok(Err(err)) => {
                        warn!("receive failed: {err}");
                    }
                    Err(_) => {}
                }
            }
            debug!("receive loop finished");
        });
    }

    fn spawn_routing_worker(&self, mut frame_rx: mpsc::Receiver<RawDatagram>) {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(datagram) = frame_rx.recv().await {
                if manager.router.handle_datagram(&datagram) == RouteOutcome::RecordLimitReached {
                    info!("record packet limit reached; ending session");
                    if manager.session.end().is_ok() {
                        manager.finish_session().await;
                    }
                    break;
                }
            }
            debug!("routing worker finished");
        });
    }

    fn spawn_transmitter(&self, socket: Arc<UdpSocket>, device_addr: SocketAddr, mode: SessionMode) {
        let session = self.session.clone();
        let metrics = self.metrics.clone();
        let net = &self.config.network;
        let period = Duration::from_millis(match mode {
            SessionMode::Recording => net.record_interval_ms,
            _ => net.monitor_interval_ms,
        });
        let payload = net.csi_request_payload.clone().into_bytes();
        let fifo_depth = net.tx_fifo_depth;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                if !session.is_transmitting() {
                    break;
                }
                match socket.send_to(&payload, device_addr).await {
                    Ok(_) => {
                        // TODO: pair by an echoed sequence number once the
                        // firmware can carry one; positional pairing drifts
                        // when replies are lost or reordered.
                        session.push_tx_timestamp(timestamp_us(), fifo_depth);
                        metrics.record_tx();
                    }
                    Err(err) => warn!("request to {device_addr} failed: {err}"),
                }
            }
            debug!("transmitter finished");
        });
    }
}

/// One-shot send from an ephemeral socket.
async fn send_once(addr: SocketAddr, payload: &[u8]) -> std::io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.send_to(payload, addr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RANGE_GATE_COUNT;
    use tokio::time::sleep;

    fn loopback_config(request_port: u16) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.network.ap_ssid = String::new();
        config.network.broadcast_ip = "127.0.0.1".to_string();
        config.network.device_ip = Some("127.0.0.1".to_string());
        config.network.request_port = request_port;
        config.network.listen_port = 0;
        config.network.monitor_interval_ms = 20;
        config.network.record_interval_ms = 20;
        config.network.socket_timeout_ms = 50;
        config
    }

    fn manager_for(
        config: PipelineConfig,
    ) -> (NetworkManager, Arc<FrameRouter>, SessionHandle, Arc<LinkMetrics>) {
        let config = Arc::new(config);
        let session = SessionHandle::new();
        let metrics = Arc::new(LinkMetrics::new());
        let router = Arc::new(FrameRouter::new(&config, session.clone()).unwrap());
        (
            NetworkManager::new(config, session.clone(), router.clone(), metrics.clone()),
            router,
            session,
            metrics,
        )
    }

    fn frame_line(doppler_rows: usize) -> String {
        let csi = vec!["1"; 256].join(" ");
        let doppler = vec!["80"; doppler_rows * RANGE_GATE_COUNT].join(",");
        format!("123456,-42,1,6,0|{csi}|1,2,3,4,5,6,7,8,9,10,11,12|{doppler}")
    }

    /// Answers discovery probes and streams one frame per CSI request.
    async fn spawn_fake_device(doppler_rows: usize) -> u16 {
        let socket = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let line = frame_line(doppler_rows);
            let mut buf = vec![0u8; 4096];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                match &buf[..len] {
                    b"Broadcast" => {
                        socket.send_to(b"Wriple-Device", from).await.ok();
                    }
                    b"Wriple" => {
                        socket.send_to(line.as_bytes(), from).await.ok();
                    }
                    b"Stop" => break,
                    _ => {}
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn discovery_learns_the_device_address() {
        let port = spawn_fake_device(20).await;
        let mut config = loopback_config(port);
        config.network.device_ip = None;
        config.network.discovery_interval_ms = 200;
        let (manager, _router, session, _metrics) = manager_for(config);

        let ip = manager.discover_device().await.unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(session.device_ip(), Some(ip));
    }

    #[tokio::test]
    async fn discovery_times_out_without_a_device() {
        // An unanswered port: bind then drop to find a free one.
        let free = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);

        let mut config = loopback_config(port);
        config.network.device_ip = None;
        config.network.discovery_retries = 2;
        config.network.discovery_interval_ms = 50;
        let (manager, _router, _session, _metrics) = manager_for(config);

        assert!(matches!(
            manager.discover_device().await,
            Err(SessionError::DeviceUnreachable { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn monitoring_round_trip_over_loopback() {
        let port = spawn_fake_device(20).await;
        let (manager, router, session, metrics) = manager_for(loopback_config(port));

        manager.start(SessionMode::Monitoring).await.unwrap();
        assert!(matches!(
            manager.start(SessionMode::Monitoring).await,
            Err(SessionError::AlreadyRunning)
        ));

        // A few transmit intervals' worth of traffic.
        sleep(Duration::from_millis(300)).await;
        assert!(router.csi_queue_len() > 0);
        let (mean, _) = router.rssi_stats(10);
        assert_eq!(mean, -42.0);
        // Receipt is counted by the receive loop itself.
        let (tx, rx) = metrics.snapshot();
        assert!(tx > 0);
        assert!(rx > 0);
        assert!(manager.packet_loss() < 1.0);

        manager.stop().await.unwrap();
        assert_eq!(session.mode(), SessionMode::Idle);
        // Stopping drains the session tasks and resets the counters.
        assert_eq!(metrics.snapshot(), (0, 0));
        assert_eq!(manager.packet_loss(), 0.0);
        assert!(matches!(manager.stop().await, Err(SessionError::NotRunning)));
    }

    #[tokio::test]
    async fn recording_stops_itself_at_the_packet_limit() {
        let port = spawn_fake_device(20).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = loopback_config(port);
        config.record.record_packet_limit = 3;
        config.record.csv_directory = dir.path().to_path_buf();
        let (manager, _router, session, _metrics) = manager_for(config);

        manager.start(SessionMode::Recording).await.unwrap();
        let mut waited = 0;
        while session.mode() != SessionMode::Idle && waited < 50 {
            sleep(Duration::from_millis(50)).await;
            waited += 1;
        }
        assert_eq!(session.mode(), SessionMode::Idle);

        let capture = dir.path().join("WRIPLE_DATA_001.csv");
        let contents = std::fs::read_to_string(capture).unwrap();
        // Header plus exactly the packet limit.
        assert_eq!(contents.lines().count(), 4);
    }
}
