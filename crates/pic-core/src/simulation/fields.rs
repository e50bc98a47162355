//! Azimuthal-mode field arrays.

use crate::array::{ArrayGroup, ResidentArray};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::residency::{DeviceResident, ResidencyId};
use pic_kernel_runtime::Complex128;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldComponent {
    Er,
    Et,
    Ez,
    Br,
    Bt,
    Bz,
    Jr,
    Jt,
    Jz,
    Rho,
}

impl FieldComponent {
    pub const ALL: [FieldComponent; 10] = [
        FieldComponent::Er,
        FieldComponent::Et,
        FieldComponent::Ez,
        FieldComponent::Br,
        FieldComponent::Bt,
        FieldComponent::Bz,
        FieldComponent::Jr,
        FieldComponent::Jt,
        FieldComponent::Jz,
        FieldComponent::Rho,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            FieldComponent::Er => "Er",
            FieldComponent::Et => "Et",
            FieldComponent::Ez => "Ez",
            FieldComponent::Br => "Br",
            FieldComponent::Bt => "Bt",
            FieldComponent::Bz => "Bz",
            FieldComponent::Jr => "Jr",
            FieldComponent::Jt => "Jt",
            FieldComponent::Jz => "Jz",
            FieldComponent::Rho => "rho",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FieldComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldComponent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldComponent::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown field component `{s}`")))
    }
}

/// Complex field components of every azimuthal mode on an `nz × nr` grid.
#[derive(Debug)]
pub struct Fields {
    nz: usize,
    nr: usize,
    n_modes: usize,
    arrays: ArrayGroup<Complex128>,
    id: ResidencyId,
}

impl Fields {
    pub fn new(nz: usize, nr: usize, n_modes: usize) -> Result<Self> {
        if nz == 0 || nr == 0 || n_modes == 0 {
            return Err(Error::InvalidArgument(format!(
                "field grid needs nz, nr and n_modes > 0, got {nz}x{nr}x{n_modes}"
            )));
        }
        let mut arrays = ArrayGroup::new();
        for m in 0..n_modes {
            for component in FieldComponent::ALL {
                arrays.push(format!("{component}_m{m}"), ResidentArray::zeros(vec![nz, nr]))?;
            }
        }
        Ok(Self {
            nz,
            nr,
            n_modes,
            arrays,
            id: ResidencyId::next(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nz, self.nr)
    }

    pub fn n_modes(&self) -> usize {
        self.n_modes
    }

    fn slot(&self, component: FieldComponent, mode: usize) -> Result<usize> {
        if mode >= self.n_modes {
            return Err(Error::InvalidArgument(format!(
                "mode {mode} out of range ({} modes)",
                self.n_modes
            )));
        }
        Ok(mode * FieldComponent::ALL.len() + component.index())
    }

    pub fn get(&self, component: FieldComponent, mode: usize) -> Result<&ResidentArray<Complex128>> {
        let slot = self.slot(component, mode)?;
        self.arrays
            .get(slot)
            .ok_or_else(|| Error::InvalidArgument(format!("{component}_m{mode} missing")))
    }

    pub fn get_mut(&mut self, component: FieldComponent, mode: usize) -> Result<&mut ResidentArray<Complex128>> {
        let slot = self.slot(component, mode)?;
        self.arrays
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidArgument(format!("{component}_m{mode} missing")))
    }

    pub fn nbytes(&self) -> usize {
        self.arrays.nbytes()
    }
}

impl DeviceResident for Fields {
    fn label(&self) -> String {
        "fields".to_string()
    }

    fn residency_id(&self) -> ResidencyId {
        self.id
    }

    fn is_on_device(&self) -> bool {
        self.arrays.is_on_device()
    }

    fn send_to_device(&mut self, executor: &Executor) -> Result<()> {
        let bytes = self.arrays.send(executor)?;
        tracing::debug!(aggregate = "fields", bytes = bytes, "sent_to_device");
        Ok(())
    }

    fn receive_from_device(&mut self, executor: &Executor) -> Result<()> {
        let bytes = self.arrays.receive(executor)?;
        tracing::debug!(aggregate = "fields", bytes = bytes, "received_from_device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_array_per_component_and_mode() {
        let fld = Fields::new(8, 4, 2).unwrap();
        assert_eq!(fld.nbytes(), 2 * 10 * 8 * 4 * 16);
        assert_eq!(fld.get(FieldComponent::Rho, 1).unwrap().shape(), &[8, 4]);
        assert!(fld.get(FieldComponent::Ez, 2).is_err());
    }

    #[test]
    fn component_names_round_trip() {
        for component in FieldComponent::ALL {
            assert_eq!(component.name().parse::<FieldComponent>().unwrap(), component);
        }
        assert!("Ex".parse::<FieldComponent>().is_err());
    }

    #[test]
    fn writes_survive_a_device_round_trip() {
        let exec = Executor::new().unwrap();
        let mut fld = Fields::new(2, 2, 1).unwrap();
        fld.get_mut(FieldComponent::Ez, 0).unwrap().host_data_mut().unwrap()[3] = Complex128::new(1.0, -1.0);

        fld.send_to_device(&exec).unwrap();
        assert!(fld.is_on_device());
        assert!(fld.get(FieldComponent::Ez, 0).unwrap().host_data().is_none());

        fld.receive_from_device(&exec).unwrap();
        assert_eq!(
            fld.get(FieldComponent::Ez, 0).unwrap().host_data().unwrap()[3],
            Complex128::new(1.0, -1.0)
        );
    }
}
