//! Macroparticle species.

use super::grid::LoadingBounds;
use crate::array::{ArrayGroup, ResidentArray};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::residency::{DeviceResident, ResidencyId};
use std::fmt;

/// Per-particle quantities, one array each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParticleQuantity {
    X,
    Y,
    Z,
    Ux,
    Uy,
    Uz,
    InvGamma,
    W,
}

impl ParticleQuantity {
    pub const ALL: [ParticleQuantity; 8] = [
        ParticleQuantity::X,
        ParticleQuantity::Y,
        ParticleQuantity::Z,
        ParticleQuantity::Ux,
        ParticleQuantity::Uy,
        ParticleQuantity::Uz,
        ParticleQuantity::InvGamma,
        ParticleQuantity::W,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ParticleQuantity::X => "x",
            ParticleQuantity::Y => "y",
            ParticleQuantity::Z => "z",
            ParticleQuantity::Ux => "ux",
            ParticleQuantity::Uy => "uy",
            ParticleQuantity::Uz => "uz",
            ParticleQuantity::InvGamma => "inv_gamma",
            ParticleQuantity::W => "w",
        }
    }
}

impl fmt::Display for ParticleQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct Species {
    name: String,
    /// Charge in coulombs.
    pub q: f64,
    /// Mass in kilograms.
    pub m: f64,
    n_particles: usize,
    arrays: ArrayGroup<f64>,
    id: ResidencyId,
}

impl Species {
    /// `n_particles` particles at rest at the origin with unit weight.
    pub fn new(name: impl Into<String>, q: f64, m: f64, n_particles: usize) -> Result<Self> {
        let mut arrays = ArrayGroup::new();
        for quantity in ParticleQuantity::ALL {
            let fill = match quantity {
                ParticleQuantity::InvGamma | ParticleQuantity::W => 1.0,
                _ => 0.0,
            };
            arrays.push(quantity.name(), ResidentArray::host(vec![fill; n_particles], vec![n_particles])?)?;
        }
        Ok(Self {
            name: name.into(),
            q,
            m,
            n_particles,
            arrays,
            id: ResidencyId::next(),
        })
    }

    /// Particles evenly spread along z over `bounds`, each centered in its
    /// share of the interval.
    pub fn uniform_along_z(name: impl Into<String>, q: f64, m: f64, bounds: &LoadingBounds) -> Result<Self> {
        let mut species = Self::new(name, q, m, bounds.n_particles)?;
        if bounds.n_particles > 0 {
            let spacing = (bounds.p_xmax - bounds.p_xmin) / bounds.n_particles as f64;
            let z = species.host_mut(ParticleQuantity::Z)?;
            for (i, zi) in z.iter_mut().enumerate() {
                *zi = bounds.p_xmin + (i as f64 + 0.5) * spacing;
            }
        }
        Ok(species)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    fn index(quantity: ParticleQuantity) -> usize {
        quantity as usize
    }

    pub fn get(&self, quantity: ParticleQuantity) -> Result<&ResidentArray<f64>> {
        self.arrays
            .get(Self::index(quantity))
            .ok_or_else(|| Error::InvalidArgument(format!("species `{}` has no `{quantity}`", self.name)))
    }

    /// Host data of one quantity; fails while the species is on the device.
    pub fn host(&self, quantity: ParticleQuantity) -> Result<&[f64]> {
        self.get(quantity)?.host_data().ok_or_else(|| {
            Error::InvalidArgument(format!("species `{}` is on the device", self.name))
        })
    }

    pub fn host_mut(&mut self, quantity: ParticleQuantity) -> Result<&mut [f64]> {
        let name = &self.name;
        self.arrays
            .get_mut(Self::index(quantity))
            .and_then(ResidentArray::host_data_mut)
            .ok_or_else(|| Error::InvalidArgument(format!("species `{name}` has no host-resident `{quantity}`")))
    }
}

impl DeviceResident for Species {
    fn label(&self) -> String {
        format!("species {}", self.name)
    }

    fn residency_id(&self) -> ResidencyId {
        self.id
    }

    fn is_on_device(&self) -> bool {
        self.arrays.is_on_device()
    }

    fn send_to_device(&mut self, executor: &Executor) -> Result<()> {
        let bytes = self.arrays.send(executor)?;
        tracing::debug!(species = %self.name, bytes = bytes, "sent_to_device");
        Ok(())
    }

    fn receive_from_device(&mut self, executor: &Executor) -> Result<()> {
        let bytes = self.arrays.receive(executor)?;
        tracing::debug!(species = %self.name, bytes = bytes, "received_from_device");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_species_is_at_rest_with_unit_weight() {
        let sp = Species::new("electrons", -1.602e-19, 9.109e-31, 4).unwrap();
        assert_eq!(sp.host(ParticleQuantity::W).unwrap(), &[1.0; 4]);
        assert_eq!(sp.host(ParticleQuantity::InvGamma).unwrap(), &[1.0; 4]);
        assert_eq!(sp.host(ParticleQuantity::Uz).unwrap(), &[0.0; 4]);
        assert!(!sp.is_on_device());
    }

    #[test]
    fn uniform_loading_centers_particles() {
        let bounds = LoadingBounds {
            p_xmin: 0.0,
            p_xmax: 4.0,
            n_particles: 4,
        };
        let sp = Species::uniform_along_z("ions", 1.0, 1.0, &bounds).unwrap();
        assert_eq!(sp.host(ParticleQuantity::Z).unwrap(), &[0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn host_access_fails_while_on_device() {
        let exec = Executor::new().unwrap();
        let mut sp = Species::new("e", -1.0, 1.0, 3).unwrap();
        sp.send_to_device(&exec).unwrap();
        assert!(sp.host(ParticleQuantity::X).is_err());
        assert!(sp.host_mut(ParticleQuantity::X).is_err());
        assert!(sp.get(ParticleQuantity::X).unwrap().device().is_some());
    }
}
