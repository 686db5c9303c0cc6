use std::sync::Arc;

use tracing::{error, info};

use super::{
    Connector, ConnectorOptions, DeviceTarget, SnmpClient, SshTransport, TelnetTransport, Transport, UdpSnmpClient,
};
use crate::models::{connection_protocol, Device};
use crate::vendor::{profile, select_vendor};

/// Supplies the transport for a device. Swapped for a scripted fake in tests.
pub trait TransportProvider: Send + Sync {
    fn transport_for(&self, device: &Device) -> Box<dyn Transport>;
    fn snmp_client_for(&self, device: &Device) -> Box<dyn SnmpClient>;
}

/// Real network transports chosen by the device's declared protocol
pub struct NetworkTransportProvider;

impl TransportProvider for NetworkTransportProvider {
    fn transport_for(&self, device: &Device) -> Box<dyn Transport> {
        if device.connection_protocol.eq_ignore_ascii_case(connection_protocol::TELNET) {
            Box::new(TelnetTransport::new())
        } else {
            Box::new(SshTransport::new())
        }
    }

    fn snmp_client_for(&self, _device: &Device) -> Box<dyn SnmpClient> {
        Box::new(UdpSnmpClient::new())
    }
}

/// Builds connectors: vendor profile from inventory metadata, transport from
/// the provider. Construction never touches the network.
#[derive(Clone)]
pub struct ConnectorFactory {
    provider: Arc<dyn TransportProvider>,
    options: ConnectorOptions,
}

impl ConnectorFactory {
    pub fn new(provider: Arc<dyn TransportProvider>, options: ConnectorOptions) -> Self {
        Self { provider, options }
    }

    pub fn get_connector(&self, device: &Device) -> Connector {
        let profile = profile(select_vendor(&device.manufacturer, &device.model));
        let target = DeviceTarget::from_device(device);
        if target.protocol == connection_protocol::SNMP {
            Connector::snmp(target, profile, self.provider.snmp_client_for(device), self.options.clone())
        } else {
            Connector::new(target, profile, self.provider.transport_for(device), self.options.clone())
        }
    }

    /// Connected connector, or `None` when the device cannot be reached.
    /// Blocking.
    pub fn create_and_connect(&self, device: &Device) -> Option<Connector> {
        let mut connector = self.get_connector(device);
        match connector.connect() {
            Ok(()) => {
                info!(device = %device.name, vendor = %connector.profile().vendor, "Connector ready");
                Some(connector)
            }
            Err(e) => {
                error!(device = %device.name, ip = %device.ip_address, "Cannot connect to device: {}", e);
                None
            }
        }
    }
}
