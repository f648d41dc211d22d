use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures::channel::mpsc::Sender;
use futures::SinkExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use mochila_alarma::config::types::LinkConfig;
use mochila_alarma::device::adapter::Adapter;
use mochila_alarma::device::runtime::{event_queue, spawn_link, LinkHandle};
use mochila_alarma::device::types::{
    Advertisement, ChannelHandle, CharacteristicInfo, DeviceId, LinkEvent, PowerState, Snapshot,
};

/// What the fake alarm does when the session talks to it.
struct Script {
    visible: bool,
    responsive: bool,
    alarm_state: String,
    calls: Vec<String>,
}

/// Answers adapter calls by queueing the events a real alarm would produce.
struct FakeAlarm {
    events: Sender<LinkEvent>,
    config: LinkConfig,
    script: Arc<Mutex<Script>>,
}

fn alarm() -> DeviceId {
    DeviceId("C0:FF:EE:00:00:01".to_string())
}

impl FakeAlarm {
    fn emit(&mut self, event: LinkEvent) {
        self.events.try_send(event).unwrap();
    }

    fn call(&self, call: impl Into<String>) {
        self.script.lock().unwrap().calls.push(call.into());
    }

    fn status_value(&self, channel: &ChannelHandle) -> LinkEvent {
        let text = self.script.lock().unwrap().alarm_state.clone();
        LinkEvent::ValueUpdated { channel: channel.clone(), result: Ok(text.into_bytes()) }
    }
}

impl Adapter for FakeAlarm {
    fn start_scan(&mut self, _service_filter: Option<Uuid>) {
        self.call("start_scan");
        if self.script.lock().unwrap().visible {
            let name = self.config.device_name.clone();
            self.emit(LinkEvent::Discovered(Advertisement {
                device: alarm(),
                name: Some(name),
                local_name: None,
                services: None,
                rssi: Some(-58),
            }));
        }
    }

    fn stop_scan(&mut self) {
        self.call("stop_scan");
    }

    fn connect(&mut self, device: &DeviceId) {
        self.call("connect");
        self.emit(LinkEvent::Connected(device.clone()));
    }

    fn cancel_connection(&mut self, device: &DeviceId) {
        self.call("cancel_connection");
        self.emit(LinkEvent::Disconnected { device: device.clone(), reason: None });
    }

    fn discover_service(&mut self, device: &DeviceId, service: Uuid) {
        self.call("discover_service");
        self.emit(LinkEvent::ServicesDiscovered { device: device.clone(), result: Ok(vec![service]) });
    }

    fn discover_characteristics(&mut self, device: &DeviceId, service: Uuid, _characteristics: &[Uuid]) {
        self.call("discover_characteristics");
        let characteristics = vec![
            CharacteristicInfo { uuid: self.config.command_uuid, writable: true, notifiable: false },
            CharacteristicInfo { uuid: self.config.status_uuid, writable: false, notifiable: true },
        ];
        self.emit(LinkEvent::CharacteristicsDiscovered {
            device: device.clone(),
            service,
            result: Ok(characteristics),
        });
    }

    fn write(&mut self, channel: &ChannelHandle, bytes: Vec<u8>) {
        let token = String::from_utf8(bytes).unwrap();
        self.call(format!("write {}", token));
        self.emit(LinkEvent::WriteCompleted { channel: channel.clone(), result: Ok(()) });

        let responsive = {
            let mut script = self.script.lock().unwrap();
            match token.as_str() {
                "ARM" => script.alarm_state = "ALARM".to_string(),
                "DISARM" => script.alarm_state = "DISARMED".to_string(),
                _ => {},
            }
            script.responsive
        };

        if responsive {
            let status = ChannelHandle {
                device: channel.device.clone(),
                service: channel.service,
                characteristic: self.config.status_uuid,
            };
            let event = match token.as_str() {
                "PING" => LinkEvent::ValueUpdated { channel: status, result: Ok(b"PONG".to_vec()) },
                _ => self.status_value(&status),
            };
            self.emit(event);
        }
    }

    fn read_value(&mut self, channel: &ChannelHandle) {
        self.call("read_value");
        let event = self.status_value(channel);
        self.emit(event);
    }

    fn set_notify(&mut self, channel: &ChannelHandle, enabled: bool) {
        self.call("set_notify");
        self.emit(LinkEvent::NotifyChanged { channel: channel.clone(), result: Ok(enabled) });
    }
}

struct Harness {
    link: LinkHandle,
    events: Sender<LinkEvent>,
    snapshots: watch::Receiver<Snapshot>,
    script: Arc<Mutex<Script>>,
    join_handle: JoinHandle<()>,
}

impl Harness {
    async fn start(visible: bool, responsive: bool) -> Harness {
        let config = LinkConfig::default();
        let script = Arc::new(Mutex::new(Script {
            visible,
            responsive,
            alarm_state: "DISARMED".to_string(),
            calls: Vec::new(),
        }));

        let (mut sender, receiver) = event_queue();
        let adapter = FakeAlarm { events: sender.clone(), config: config.clone(), script: script.clone() };
        sender.send(LinkEvent::PowerChanged(PowerState::PoweredOn)).await.unwrap();

        let (link, join_handle) = spawn_link(config, adapter, (sender.clone(), receiver), CancellationToken::new());
        let snapshots = link.subscribe();

        Harness { link, events: sender, snapshots, script, join_handle }
    }

    async fn wait_for(&mut self, predicate: impl Fn(&Snapshot) -> bool) -> Snapshot {
        let wait = async {
            loop {
                {
                    let snapshot = self.snapshots.borrow_and_update();
                    if predicate(&snapshot) {
                        return snapshot.clone();
                    }
                }
                self.snapshots.changed().await.unwrap();
            }
        };

        timeout(Duration::from_secs(60), wait).await.expect("condition never became true")
    }

    fn count(&self, call: &str) -> usize {
        self.script.lock().unwrap().calls.iter().filter(|c| c.as_str() == call).count()
    }

    async fn stop(self) {
        self.link.shutdown();
        self.join_handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn connects_and_arms() {
    let mut harness = Harness::start(true, true).await;

    let snapshot = harness.wait_for(|s| s.connected && s.status_text == "DISARMED").await;
    assert!(snapshot.bluetooth_ready);
    assert_eq!(snapshot.last_rssi, Some(-58));
    assert_eq!(snapshot.last_error, None);

    harness.link.arm().await.unwrap();
    let snapshot = harness.wait_for(|s| s.status_text == "ALARM").await;
    assert!(!snapshot.busy);
    assert_eq!(harness.count("write ARM"), 1);

    harness.link.disarm().await.unwrap();
    harness.wait_for(|s| s.status_text == "DISARMED" && !s.busy).await;

    harness.link.ping().await.unwrap();
    harness.wait_for(|s| s.status_text == "PONG").await;

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn scan_restarts_after_timeout() {
    let mut harness = Harness::start(false, true).await;
    harness.wait_for(|s| s.status_text == "Scanning…").await;
    let started = Instant::now();

    let snapshot = harness.wait_for(|s| s.last_error.is_some()).await;
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(snapshot.last_error.as_deref(), Some("Device not found after 10 s of scanning"));
    assert_eq!(snapshot.status_text, "Scanning…");
    assert_eq!(harness.count("start_scan"), 2);
    assert_eq!(harness.count("stop_scan"), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_command_times_out() {
    let mut harness = Harness::start(true, false).await;
    harness.wait_for(|s| s.connected && s.status_text == "DISARMED").await;

    harness.link.arm().await.unwrap();
    let started = Instant::now();
    assert!(harness.link.snapshot().busy);

    // a second command is refused while the first is outstanding
    assert!(harness.link.request_status().await.is_err());

    let snapshot = harness.wait_for(|s| !s.busy).await;
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(snapshot.last_error.as_deref(), Some("No response to command ARM after 3 s"));
    assert!(snapshot.connected);
    assert_eq!(harness.count("write STATUS"), 0);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_link_loss() {
    let mut harness = Harness::start(true, true).await;
    harness.wait_for(|s| s.connected && s.status_text == "DISARMED").await;

    harness.events.send(LinkEvent::Disconnected {
        device: alarm(),
        reason: Some("supervision timeout".to_string()),
    }).await.unwrap();
    let snapshot = harness.wait_for(|s| !s.connected && s.last_error.is_some()).await;
    assert_eq!(snapshot.last_error.as_deref(), Some("Disconnected: supervision timeout"));
    let lost = Instant::now();

    harness.wait_for(|s| s.connected && s.status_text == "DISARMED").await;
    assert!(lost.elapsed() >= Duration::from_secs(2));
    assert_eq!(harness.count("connect"), 2);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn commands_fail_when_not_connected() {
    let mut harness = Harness::start(false, true).await;
    harness.wait_for(|s| s.status_text == "Scanning…").await;

    let err = harness.link.arm().await.unwrap_err();
    assert_eq!(err.to_string(), "Not connected");
    assert_eq!(harness.count("write ARM"), 0);

    harness.link.clear_logs().unwrap();
    let snapshot = harness.wait_for(|s| s.log_lines.len() == 1).await;
    assert!(snapshot.log_lines[0].ends_with("Log cleared"));

    harness.stop().await;
}
