//! Discovered service catalog.
//!
//! Holds the services and characteristics found on the peripheral for one
//! connection epoch.

use std::collections::BTreeMap;

use crate::ble::transport::{CharacteristicId, GattCharacteristic, GattService};

/// The services and characteristics discovered on the connected peripheral.
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: Vec<GattService>,
    characteristics: BTreeMap<CharacteristicId, GattCharacteristic>,
}

impl ServiceCatalog {
    /// Build a catalog from a discovery result.
    pub fn from_services(services: Vec<GattService>) -> Self {
        let characteristics = services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .map(|characteristic| (characteristic.id, characteristic.clone()))
            .collect();

        Self {
            services,
            characteristics,
        }
    }

    /// Check if nothing has been discovered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// All discovered services.
    pub fn services(&self) -> &[GattService] {
        &self.services
    }

    /// Look up a characteristic.
    pub fn get(&self, id: &CharacteristicId) -> Option<&GattCharacteristic> {
        self.characteristics.get(id)
    }

    /// Check if a characteristic exists.
    pub fn contains(&self, id: &CharacteristicId) -> bool {
        self.characteristics.contains_key(id)
    }

    /// Declared property bits of a characteristic, or 0 if unknown.
    pub fn format_flags(&self, id: &CharacteristicId) -> u8 {
        self.get(id).map(|c| c.properties.bits()).unwrap_or(0)
    }

    /// Number of discovered characteristics.
    pub fn characteristic_count(&self) -> usize {
        self.characteristics.len()
    }
}
