use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter as BtleCentral, Manager, Peripheral, PeripheralId};
use futures::channel::mpsc::{unbounded, Sender, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::adapter::Adapter;
use crate::device::types::{
    Advertisement, ChannelHandle, CharacteristicInfo, DeviceId, LinkEvent, PowerState,
    UnavailableReason,
};
use crate::error::DeviceError;

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

#[derive(Debug)]
enum AdapterCommand {
    StartScan(Option<Uuid>),
    StopScan,
    Connect(DeviceId),
    CancelConnection(DeviceId),
    DiscoverService(DeviceId, Uuid),
    DiscoverCharacteristics(DeviceId, Uuid, Vec<Uuid>),
    Write(ChannelHandle, Vec<u8>),
    Read(ChannelHandle),
    SetNotify(ChannelHandle, bool),
}

/// [`Adapter`] backed by btleplug. Calls are queued to the bridge task, which performs them and
/// reports the outcome on the link's event queue.
pub struct BtleAdapter {
    commands: UnboundedSender<AdapterCommand>,
}

impl BtleAdapter {
    fn send(&self, command: AdapterCommand) {
        if let Err(err) = self.commands.unbounded_send(command) {
            warn!("Bluetooth bridge is not running, dropping {:?}", err.into_inner());
        }
    }
}

impl Adapter for BtleAdapter {
    fn start_scan(&mut self, service_filter: Option<Uuid>) {
        self.send(AdapterCommand::StartScan(service_filter));
    }

    fn stop_scan(&mut self) {
        self.send(AdapterCommand::StopScan);
    }

    fn connect(&mut self, device: &DeviceId) {
        self.send(AdapterCommand::Connect(device.clone()));
    }

    fn cancel_connection(&mut self, device: &DeviceId) {
        self.send(AdapterCommand::CancelConnection(device.clone()));
    }

    fn discover_service(&mut self, device: &DeviceId, service: Uuid) {
        self.send(AdapterCommand::DiscoverService(device.clone(), service));
    }

    fn discover_characteristics(&mut self, device: &DeviceId, service: Uuid, characteristics: &[Uuid]) {
        self.send(AdapterCommand::DiscoverCharacteristics(device.clone(), service, characteristics.to_vec()));
    }

    fn write(&mut self, channel: &ChannelHandle, bytes: Vec<u8>) {
        self.send(AdapterCommand::Write(channel.clone(), bytes));
    }

    fn read_value(&mut self, channel: &ChannelHandle) {
        self.send(AdapterCommand::Read(channel.clone()));
    }

    fn set_notify(&mut self, channel: &ChannelHandle, enabled: bool) {
        self.send(AdapterCommand::SetNotify(channel.clone(), enabled));
    }
}

fn map_central_state(state: &CentralState) -> Option<PowerState> {
    match state {
        CentralState::PoweredOn => Some(PowerState::PoweredOn),
        CentralState::PoweredOff => Some(PowerState::Unavailable(UnavailableReason::PoweredOff)),
        _ => None,
    }
}

fn characteristic_info(characteristic: &Characteristic) -> CharacteristicInfo {
    let properties = characteristic.properties;

    CharacteristicInfo {
        uuid: characteristic.uuid,
        writable: properties.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notifiable: properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    }
}

// Runs `operation` on its own task so the bridge loop keeps draining events, then queues its result.
fn spawn_reporting<F>(mut events: Sender<LinkEvent>, operation: F)
where
    F: Future<Output = LinkEvent> + Send + 'static,
{
    spawn(async move {
        let event = operation.await;
        if events.send(event).await.is_err() {
            debug!("Link is gone, dropping adapter result");
        }
    });
}

struct Bridge {
    central: BtleCentral,
    events: Sender<LinkEvent>,
    cancel: CancellationToken,
    peripherals: HashMap<DeviceId, Peripheral>,
    // one notification reader per device
    notifications: HashMap<DeviceId, CancellationToken>,
}

impl Bridge {
    async fn emit(&mut self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Link is gone, dropping adapter event");
        }
    }

    async fn power_state(&self) -> PowerState {
        match self.central.adapter_state().await {
            Ok(state) => match map_central_state(&state) {
                Some(power) => power,
                // Not every platform reports its state; assume the radio works and let scanning tell.
                None => {
                    warn!("Adapter reports state {:?}, assuming it is powered on", state);
                    PowerState::PoweredOn
                },
            },
            Err(btleplug::Error::PermissionDenied) => PowerState::Unavailable(UnavailableReason::Unauthorized),
            Err(btleplug::Error::NotSupported(reason)) => {
                warn!("Adapter state not supported ({}), assuming it is powered on", reason);
                PowerState::PoweredOn
            },
            Err(err) => {
                warn!("Failed to query adapter state: {}", err);
                PowerState::Unavailable(UnavailableReason::Unknown)
            },
        }
    }

    fn peripheral(&self, device: &DeviceId) -> Result<Peripheral, DeviceError> {
        self.peripherals
            .get(device)
            .cloned()
            .ok_or_else(|| DeviceError::UnknownDevice(device.to_string()))
    }

    fn characteristic(&self, channel: &ChannelHandle) -> Result<(Peripheral, Characteristic), DeviceError> {
        let peripheral = self.peripheral(&channel.device)?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == channel.characteristic && c.service_uuid == channel.service)
            .ok_or(DeviceError::MissingCharacteristic)?;

        Ok((peripheral, characteristic))
    }

    async fn run(mut self, mut central_events: CentralEvents, mut commands: UnboundedReceiver<AdapterCommand>) {
        let power = self.power_state().await;
        info!("Adapter power state: {:?}", power);
        self.emit(LinkEvent::PowerChanged(power)).await;

        'mainloop: loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = central_events.next() => {
                    self.on_central_event(event).await;
                },
                Some(command) = commands.next() => {
                    self.on_command(command).await;
                },
            }
        }

        for (_, token) in self.notifications.drain() {
            token.cancel();
        }
        if let Err(err) = self.central.stop_scan().await {
            debug!("Failed to stop scan on shutdown: {}", err);
        }
        info!("Bluetooth bridge stopped");
    }

    async fn on_central_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                self.on_advertisement(id).await;
            },
            CentralEvent::DeviceDisconnected(id) => {
                let device = DeviceId(id.to_string());
                if let Some(token) = self.notifications.remove(&device) {
                    token.cancel();
                }
                self.emit(LinkEvent::Disconnected { device, reason: None }).await;
            },
            CentralEvent::StateUpdate(state) => match map_central_state(&state) {
                Some(power) => self.emit(LinkEvent::PowerChanged(power)).await,
                None => debug!("Ignoring adapter state {:?}", state),
            },
            _ => {},
        }
    }

    async fn on_advertisement(&mut self, id: PeripheralId) {
        let peripheral = match self.central.peripheral(&id).await {
            Ok(peripheral) => peripheral,
            Err(err) => {
                warn!("Failed to look up peripheral {}: {}", id, err);
                return;
            },
        };

        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => {
                debug!("Peripheral {} has no properties", id);
                return;
            },
            Err(err) => {
                warn!("Could not query peripheral for properties: {:?}", err);
                return;
            },
        };

        let device = DeviceId(id.to_string());
        self.peripherals.insert(device.clone(), peripheral);

        // btleplug only exposes the advertised local name
        let advertisement = Advertisement {
            device,
            name: None,
            local_name: properties.local_name,
            services: Some(properties.services),
            rssi: properties.rssi,
        };
        self.emit(LinkEvent::Discovered(advertisement)).await;
    }

    async fn on_command(&mut self, command: AdapterCommand) {
        debug!("Adapter command {:?}", command);

        match command {
            AdapterCommand::StartScan(filter) => {
                let filter = ScanFilter { services: filter.into_iter().collect() };

                match self.central.start_scan(filter).await {
                    Ok(()) => {},
                    Err(btleplug::Error::PermissionDenied) => {
                        let power = PowerState::Unavailable(UnavailableReason::Unauthorized);
                        self.emit(LinkEvent::PowerChanged(power)).await;
                    },
                    // the scan timeout restarts the scan
                    Err(err) => warn!("Scanning failed: {}", err),
                }
            },
            AdapterCommand::StopScan => {
                if let Err(err) = self.central.stop_scan().await {
                    warn!("Failed to stop scan: {}", err);
                }
            },
            AdapterCommand::Connect(device) => {
                let peripheral = match self.peripheral(&device) {
                    Ok(peripheral) => peripheral,
                    Err(err) => {
                        self.emit(LinkEvent::ConnectFailed { device, reason: err.to_string() }).await;
                        return;
                    },
                };

                spawn_reporting(self.events.clone(), async move {
                    match peripheral.connect().await {
                        Ok(()) => LinkEvent::Connected(device),
                        Err(err) => LinkEvent::ConnectFailed { device, reason: err.to_string() },
                    }
                });
            },
            AdapterCommand::CancelConnection(device) => {
                if let Some(token) = self.notifications.remove(&device) {
                    token.cancel();
                }

                if let Ok(peripheral) = self.peripheral(&device) {
                    spawn(async move {
                        if let Err(err) = peripheral.disconnect().await {
                            warn!("Failed to disconnect: {}", err);
                        }
                    });
                }
            },
            AdapterCommand::DiscoverService(device, service) => {
                let peripheral = match self.peripheral(&device) {
                    Ok(peripheral) => peripheral,
                    Err(err) => {
                        self.emit(LinkEvent::ServicesDiscovered { device, result: Err(err.to_string()) }).await;
                        return;
                    },
                };

                debug!("Discovering services, looking for {}", service);
                spawn_reporting(self.events.clone(), async move {
                    let result = match peripheral.discover_services().await {
                        Ok(()) => Ok(peripheral.services().into_iter().map(|s| s.uuid).collect()),
                        Err(err) => Err(err.to_string()),
                    };
                    LinkEvent::ServicesDiscovered { device, result }
                });
            },
            AdapterCommand::DiscoverCharacteristics(device, service, wanted) => {
                // characteristics were discovered together with the services
                let result = self.peripheral(&device)
                    .map_err(|err| err.to_string())
                    .and_then(|peripheral| {
                        peripheral.services()
                            .into_iter()
                            .find(|s| s.uuid == service)
                            .map(|s| {
                                s.characteristics.iter()
                                    .filter(|c| wanted.contains(&c.uuid))
                                    .map(characteristic_info)
                                    .collect()
                            })
                            .ok_or_else(|| format!("service {} not discovered", service))
                    });

                self.emit(LinkEvent::CharacteristicsDiscovered { device, service, result }).await;
            },
            AdapterCommand::Write(channel, bytes) => {
                let (peripheral, characteristic) = match self.characteristic(&channel) {
                    Ok(found) => found,
                    Err(err) => {
                        self.emit(LinkEvent::WriteCompleted { channel, result: Err(err.to_string()) }).await;
                        return;
                    },
                };

                spawn_reporting(self.events.clone(), async move {
                    let result = peripheral
                        .write(&characteristic, &bytes, WriteType::WithResponse)
                        .await
                        .map_err(|err| err.to_string());
                    LinkEvent::WriteCompleted { channel, result }
                });
            },
            AdapterCommand::Read(channel) => {
                let (peripheral, characteristic) = match self.characteristic(&channel) {
                    Ok(found) => found,
                    Err(err) => {
                        self.emit(LinkEvent::ValueUpdated { channel, result: Err(err.to_string()) }).await;
                        return;
                    },
                };

                spawn_reporting(self.events.clone(), async move {
                    let result = peripheral.read(&characteristic).await.map_err(|err| err.to_string());
                    LinkEvent::ValueUpdated { channel, result }
                });
            },
            AdapterCommand::SetNotify(channel, enabled) => {
                let (peripheral, characteristic) = match self.characteristic(&channel) {
                    Ok(found) => found,
                    Err(err) => {
                        self.emit(LinkEvent::NotifyChanged { channel, result: Err(err.to_string()) }).await;
                        return;
                    },
                };

                if let Some(token) = self.notifications.remove(&channel.device) {
                    token.cancel();
                }
                if enabled {
                    let token = self.cancel.child_token();
                    self.notifications.insert(channel.device.clone(), token.clone());
                    read_notifications_task(token, peripheral.clone(), channel.clone(), self.events.clone());
                }

                spawn_reporting(self.events.clone(), async move {
                    let result = match enabled {
                        true => peripheral.subscribe(&characteristic).await,
                        false => peripheral.unsubscribe(&characteristic).await,
                    };
                    LinkEvent::NotifyChanged { channel, result: result.map(|_| enabled).map_err(|err| err.to_string()) }
                });
            },
        }
    }
}

fn read_notifications_task(
    cancel: CancellationToken,
    peripheral: Peripheral,
    channel: ChannelHandle,
    mut events: Sender<LinkEvent>,
) -> JoinHandle<()> {
    spawn(async move {
        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                let result = Err(format!("notifications unavailable: {}", err));
                let _ = events.send(LinkEvent::NotifyChanged { channel, result }).await;
                return;
            },
        };

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                notification = notification_stream.next() => match notification {
                    Some(data) if data.uuid == channel.characteristic => {
                        let event = LinkEvent::ValueUpdated { channel: channel.clone(), result: Ok(data.value) };
                        if events.send(event).await.is_err() {
                            break 'mainloop;
                        }
                    },
                    Some(_) => {},
                    None => break 'mainloop,
                },
            }
        }

        debug!("Notification reader for {} stopped", channel.device);
    })
}

/// Opens the first Bluetooth adapter and starts the bridge task that serves [`BtleAdapter`].
pub async fn spawn_btle_bridge(
    cancel: CancellationToken,
    events: Sender<LinkEvent>,
) -> Result<(BtleAdapter, JoinHandle<()>), DeviceError> {
    let manager = Manager::new().await?;
    let central = manager.adapters().await?.into_iter().next().ok_or(DeviceError::NoAdapter)?;
    info!("Using adapter {}", central.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

    let central_events = central.events().await?;
    let (commands, command_receiver) = unbounded::<AdapterCommand>();

    let bridge = Bridge {
        central,
        events,
        cancel,
        peripherals: HashMap::new(),
        notifications: HashMap::new(),
    };
    let handle = spawn(bridge.run(central_events, command_receiver));

    Ok((BtleAdapter { commands }, handle))
}
