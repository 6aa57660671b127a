use anyhow::{Context, Result};
use tracing::{info, warn};

use krackscan_core::{
    cancel_flag, cancel_on_interrupt, CcmpKeyService, DetectionEngine, DetectorConfig,
};
use krackscan_ctrl::CtrlConnector;
use krackscan_wireless::{MonitorTransport, PacketSocket};

fn main() -> Result<()> {
    let config = DetectorConfig::from_env().context("loading configuration")?;
    let log_cfg = krackscan_logging::fs::read_config(&config.root_path);
    let _logging_guards = krackscan_logging::init("krackscand", &config.root_path, &log_cfg)?;

    let stop = cancel_flag();
    cancel_on_interrupt(&stop)?;

    let mut ctrl = CtrlConnector::new()
        .with_udp_port(config.ctrl_port)
        .with_request_timeout(config.ctrl_timeout)
        .connect(&config.ctrl_path)
        .with_context(|| format!("connecting to control interface {}", config.ctrl_path))?;
    ctrl.attach().context("attaching to control interface")?;

    let socket = PacketSocket::open(&config.mon_iface)
        .with_context(|| format!("opening monitor interface {}", config.mon_iface))?;
    info!(
        ap = %config.ap_mac,
        monitor = %config.mon_iface,
        ctrl = %config.ctrl_path,
        "krackscand started"
    );

    let mut engine = DetectionEngine::new(
        MonitorTransport::new(socket),
        ctrl,
        CcmpKeyService::new(config.ctrl_timeout),
        config.engine_options(),
    );

    let outcome = engine.run(&stop);
    engine.log_summary();

    let (_monitor, mut ctrl) = engine.into_parts();
    if let Err(err) = ctrl.close() {
        if outcome.is_ok() {
            return Err(err).context("closing control interface");
        }
        warn!("Error while closing control interface: {}", err);
    }

    outcome.context("capture loop failed")
}
