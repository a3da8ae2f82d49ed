//! Two-way port table
//!
//! Keeps port→application and application→port in step so that both
//! "one application per port" and "one port per application" hold after every
//! mutation.

use crate::domain::{ApplicationId, DeviceId, Port, Receiver};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// An application listening on a port
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) application: ApplicationId,
    pub(crate) receiver: Arc<dyn Receiver>,
}

#[derive(Default)]
pub(crate) struct PortTable {
    by_port: BTreeMap<Port, Binding>,
    by_application: HashMap<ApplicationId, Port>,
}

impl PortTable {
    /// Bind `application` to `port`; strict policy, a bound application must
    /// be released before it can bind again
    pub(crate) fn bind(
        &mut self,
        device: DeviceId,
        port: Port,
        application: ApplicationId,
        receiver: Arc<dyn Receiver>,
    ) -> Result<()> {
        if let Some(existing) = self.by_port.get(&port) {
            return Err(Error::PortTaken {
                device,
                port,
                holder: existing.application,
            });
        }
        if let Some(&bound) = self.by_application.get(&application) {
            return Err(Error::AlreadyBound {
                application,
                bound,
                requested: port,
            });
        }
        self.by_port.insert(
            port,
            Binding {
                application,
                receiver,
            },
        );
        self.by_application.insert(application, port);
        Ok(())
    }

    /// Free `port`, returning whoever held it
    pub(crate) fn release_port(&mut self, port: Port) -> Option<ApplicationId> {
        let binding = self.by_port.remove(&port)?;
        self.by_application.remove(&binding.application);
        Some(binding.application)
    }

    /// Free whatever port `application` holds
    pub(crate) fn release_application(&mut self, application: ApplicationId) -> Option<Port> {
        let port = self.by_application.remove(&application)?;
        self.by_port.remove(&port);
        Some(port)
    }

    pub(crate) fn receiver_on(&self, port: Port) -> Option<Arc<dyn Receiver>> {
        self.by_port.get(&port).map(|b| Arc::clone(&b.receiver))
    }

    pub(crate) fn holder_of(&self, port: Port) -> Option<ApplicationId> {
        self.by_port.get(&port).map(|b| b.application)
    }

    pub(crate) fn port_of(&self, application: ApplicationId) -> Option<Port> {
        self.by_application.get(&application).copied()
    }

    /// Every receiver, in port order
    pub(crate) fn receivers(&self) -> Vec<Arc<dyn Receiver>> {
        self.by_port.values().map(|b| Arc::clone(&b.receiver)).collect()
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<Port, ApplicationId> {
        self.by_port
            .iter()
            .map(|(port, b)| (*port, b.application))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_port.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use assert_matches::assert_matches;

    struct Silent;

    impl Receiver for Silent {
        fn on_message(&self, _message: &Message) {}
        fn on_broadcast(&self, _payload: &str) {}
    }

    fn silent() -> Arc<dyn Receiver> {
        Arc::new(Silent)
    }

    #[test]
    fn test_bind_keeps_both_directions() {
        let mut table = PortTable::default();
        let app = ApplicationId(1);
        table.bind(DeviceId(1), Port(5), app, silent()).unwrap();

        assert_eq!(table.holder_of(Port(5)), Some(app));
        assert_eq!(table.port_of(app), Some(Port(5)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bind_conflicts() {
        let mut table = PortTable::default();
        let a = ApplicationId(1);
        let b = ApplicationId(2);
        table.bind(DeviceId(1), Port(5), a, silent()).unwrap();

        assert_matches!(
            table.bind(DeviceId(1), Port(5), b, silent()),
            Err(Error::PortTaken { holder, .. }) if holder == a
        );
        assert_matches!(
            table.bind(DeviceId(1), Port(6), a, silent()),
            Err(Error::AlreadyBound { bound: Port(5), requested: Port(6), .. })
        );
        assert_eq!(table.holder_of(Port(5)), Some(a));
        assert_eq!(table.holder_of(Port(6)), None);
    }

    #[test]
    fn test_release_clears_both_directions() {
        let mut table = PortTable::default();
        let a = ApplicationId(1);
        let b = ApplicationId(2);
        table.bind(DeviceId(1), Port(1), a, silent()).unwrap();
        table.bind(DeviceId(1), Port(2), b, silent()).unwrap();

        assert_eq!(table.release_port(Port(1)), Some(a));
        assert_eq!(table.port_of(a), None);
        assert_eq!(table.release_port(Port(1)), None);

        assert_eq!(table.release_application(b), Some(Port(2)));
        assert_eq!(table.holder_of(Port(2)), None);
        assert_eq!(table.len(), 0);
    }
}
