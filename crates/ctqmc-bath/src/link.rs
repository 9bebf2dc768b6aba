//! Flavor-to-component map and Green's function measurement.

use std::f64::consts::PI;

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{BathEntry, FlavoredOperator, Link, Measurements, QmcError};
use indexmap::IndexMap;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::hyb::{HybEntry, HybFunction};

/// Marker for flavor pairs without hybridization.
pub const EMPTY_COMPONENT: &str = "empty";

/// Numerical parameters of the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    /// Inverse temperature.
    pub beta: f64,
    /// Energy cutoff setting the imaginary-time grid density.
    pub hyb_cutoff: f64,
    /// Number of fermionic frequencies measured for the Green's function.
    pub green_frequencies: usize,
}

#[derive(Debug, Clone)]
struct Component {
    name: String,
    function: HybFunction,
    multiplicity: usize,
    green: Vec<Complex64>,
}

/// Component table over `2 * n_site` flavors, `flavor = spin * n_site + site`.
#[derive(Debug, Clone)]
pub struct HybLink {
    params: LinkParams,
    n_site: usize,
    table: Vec<Option<usize>>,
    components: Vec<Component>,
}

impl HybLink {
    /// Builds the link from a component table and the named hybridization data.
    pub fn new(
        params: LinkParams,
        n_site: usize,
        table: &[Vec<String>],
        entries: &IndexMap<String, HybEntry>,
    ) -> Result<Self, QmcError> {
        let flavors = 2 * n_site;
        if table.len() != flavors || table.iter().any(|row| row.len() != flavors) {
            return Err(QmcError::Config(
                ErrorInfo::new("link-shape", "component table must be square over all flavors")
                    .with_context("flavors", flavors.to_string())
                    .with_context("rows", table.len().to_string()),
            ));
        }

        let mut components: Vec<Component> = Vec::new();
        let mut index_of: IndexMap<&str, usize> = IndexMap::new();
        let mut resolved = Vec::with_capacity(flavors * flavors);
        for name in table.iter().flatten() {
            if name == EMPTY_COMPONENT {
                resolved.push(None);
                continue;
            }
            let idx = match index_of.get(name.as_str()) {
                Some(&idx) => idx,
                None => {
                    let entry = entries.get(name).ok_or_else(|| {
                        QmcError::Config(
                            ErrorInfo::new("link-missing-component", "no hybridization data for component")
                                .with_context("component", name.clone())
                                .with_hint("add the component to the hybridization file"),
                        )
                    })?;
                    let function = HybFunction::new(entry, params.beta, params.hyb_cutoff)?;
                    components.push(Component {
                        name: name.clone(),
                        function,
                        multiplicity: 0,
                        green: vec![Complex64::new(0.0, 0.0); params.green_frequencies],
                    });
                    index_of.insert(name.as_str(), components.len() - 1);
                    components.len() - 1
                }
            };
            components[idx].multiplicity += 1;
            resolved.push(Some(idx));
        }

        Ok(Self {
            params,
            n_site,
            table: resolved,
            components,
        })
    }

    fn flavor(&self, op: &FlavoredOperator) -> usize {
        op.spin.index() * self.n_site + op.site
    }

    fn component(&self, annihilator: &FlavoredOperator, creator: &FlavoredOperator) -> Option<usize> {
        let flavors = 2 * self.n_site;
        self.table
            .get(self.flavor(annihilator) * flavors + self.flavor(creator))
            .copied()
            .flatten()
    }

    /// Names of the non-empty components in first-appearance order.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|component| component.name.as_str())
    }

    /// Parameters the link was built with.
    pub fn params(&self) -> &LinkParams {
        &self.params
    }
}

impl Link for HybLink {
    fn hybridization(&self, annihilator: &FlavoredOperator, creator: &FlavoredOperator) -> f64 {
        match self.component(annihilator, creator) {
            Some(idx) => self.components[idx]
                .function
                .antiperiodic(annihilator.op.time - creator.op.time),
            None => 0.0,
        }
    }

    fn measure(&mut self, sign: i32, entries: &mut dyn Iterator<Item = BathEntry>) {
        let beta = self.params.beta;
        let weight = -f64::from(sign) / beta;
        for entry in entries {
            let Some(idx) = self.component(&entry.annihilator, &entry.creator) else {
                continue;
            };
            let delta = entry.annihilator.op.time - entry.creator.op.time;
            let scale = weight * entry.inverse;
            for (n, value) in self.components[idx].green.iter_mut().enumerate() {
                let omega = PI * (2 * n + 1) as f64 / beta;
                *value += Complex64::from_polar(scale, omega * delta);
            }
        }
    }

    fn store(&mut self, sink: &mut Measurements, count: usize) {
        for component in &mut self.components {
            let norm = (count.max(1) * component.multiplicity.max(1)) as f64;
            let real = component.green.iter().map(|value| value.re / norm).collect();
            let imag = component.green.iter().map(|value| value.im / norm).collect();
            sink.push_vector(format!("G_{}_re", component.name), real);
            sink.push_vector(format!("G_{}_im", component.name), imag);
            component
                .green
                .iter_mut()
                .for_each(|value| *value = Complex64::new(0.0, 0.0));
        }
    }
}
