use std::collections::HashMap;

use common::error::{Error, Result};
use common::sd::target::{Target, ADDRESS_LABEL, HOST_ADDRESS_LABEL, JOB_LABEL, NAMESPACE_LABEL, POD_LABEL};

use crate::common::registry::Params;
use crate::relabel::transform::Transformation;

const SCHEME_SEPARATOR: &str = "://";

fn check_params(name: &str, params: &Params, allowed: &[&str]) -> Result<()> {
    for key in params.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(Error::InvalidArguments(format!(
                "unknown parameter {:?} for {} (expected one of {:?})",
                key, name, allowed
            )));
        }
    }
    Ok(())
}

fn param(params: &Params, key: &str, default: &str) -> Result<String> {
    match params.get(key) {
        Some(value) if value.is_empty() => Err(Error::InvalidArguments(format!("parameter {:?} must not be empty", key))),
        Some(value) => Ok(value.clone()),
        None => Ok(default.to_string()),
    }
}

/// Returns the targets unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Passthrough {
    pub const NAME: &'static str = "passthrough";

    pub fn from_params(params: &Params) -> Result<Self> {
        check_params(Self::NAME, params, &[])?;
        Ok(Self)
    }
}

impl Transformation for Passthrough {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn relabel_targets(&self, targets: Vec<Target>) -> Result<Vec<Target>> {
        Ok(targets)
    }
}

/// Splits a structured label such as `job="team-a/worker-1"` on its first
/// delimiter and writes the two halves into their own labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLabel {
    pub source_label: String,
    pub delimiter: String,
    pub first_label: String,
    pub second_label: String,
}

impl Default for SplitLabel {
    fn default() -> Self {
        Self {
            source_label: JOB_LABEL.to_string(),
            delimiter: "/".to_string(),
            first_label: NAMESPACE_LABEL.to_string(),
            second_label: POD_LABEL.to_string(),
        }
    }
}

impl SplitLabel {
    pub const NAME: &'static str = "split_label";

    pub fn from_params(params: &Params) -> Result<Self> {
        check_params(
            Self::NAME,
            params,
            &["source_label", "delimiter", "first_label", "second_label"],
        )?;
        let defaults = Self::default();
        let split = Self {
            source_label: param(params, "source_label", &defaults.source_label)?,
            delimiter: param(params, "delimiter", &defaults.delimiter)?,
            first_label: param(params, "first_label", &defaults.first_label)?,
            second_label: param(params, "second_label", &defaults.second_label)?,
        };
        if split.first_label == split.second_label {
            return Err(Error::InvalidArguments(format!(
                "first_label and second_label must differ, both are {:?}",
                split.first_label
            )));
        }
        Ok(split)
    }

    fn split(&self, target: &mut Target) -> Result<()> {
        let value = target.get(&self.source_label).ok_or_else(|| Error::MissingLabel {
            target: target.to_string(),
            label: self.source_label.clone(),
        })?;
        let (first, second) = match value.split_once(self.delimiter.as_str()) {
            Some((first, second)) if !first.is_empty() && !second.is_empty() => {
                (first.to_string(), second.to_string())
            }
            _ => {
                return Err(Error::MalformedTarget {
                    target: target.to_string(),
                    label: self.source_label.clone(),
                    value: value.to_string(),
                    delimiter: self.delimiter.clone(),
                })
            }
        };
        target.set(self.first_label.clone(), first);
        target.set(self.second_label.clone(), second);
        Ok(())
    }
}

impl Transformation for SplitLabel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn relabel_targets(&self, mut targets: Vec<Target>) -> Result<Vec<Target>> {
        for target in targets.iter_mut() {
            self.split(target)?;
        }
        Ok(targets)
    }
}

/// Correlates targets that point at the same host.
///
/// A target whose address carries a scheme (`mysql://node01/db`) is keyed by
/// the host part of the address. Any other target is keyed by its whole
/// address, which moves to the host label. Targets sharing a key are merged
/// in input order with later labels winning; the output keeps the order in
/// which each key was first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinByHost {
    pub address_label: String,
    pub host_label: String,
}

impl Default for JoinByHost {
    fn default() -> Self {
        Self {
            address_label: ADDRESS_LABEL.to_string(),
            host_label: HOST_ADDRESS_LABEL.to_string(),
        }
    }
}

impl JoinByHost {
    pub const NAME: &'static str = "join_by_host";

    pub fn from_params(params: &Params) -> Result<Self> {
        check_params(Self::NAME, params, &["address_label", "host_label"])?;
        let defaults = Self::default();
        Ok(Self {
            address_label: param(params, "address_label", &defaults.address_label)?,
            host_label: param(params, "host_label", &defaults.host_label)?,
        })
    }

    fn key(&self, target: &mut Target) -> Result<String> {
        let address = target
            .get(&self.address_label)
            .map(str::to_string)
            .ok_or_else(|| Error::MissingLabel {
                target: target.to_string(),
                label: self.address_label.clone(),
            })?;

        if address.contains(SCHEME_SEPARATOR) {
            return match address.split('/').nth(2) {
                Some(host) if !host.is_empty() => Ok(host.to_string()),
                _ => Err(Error::MalformedTarget {
                    target: target.to_string(),
                    label: self.address_label.clone(),
                    value: address,
                    delimiter: SCHEME_SEPARATOR.to_string(),
                }),
            };
        }
        target.remove(&self.address_label);
        target.set(self.host_label.clone(), address.clone());
        Ok(address)
    }
}

impl Transformation for JoinByHost {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn relabel_targets(&self, targets: Vec<Target>) -> Result<Vec<Target>> {
        let mut order = Vec::new();
        let mut joined: HashMap<String, Target> = HashMap::with_capacity(targets.len());
        for mut target in targets {
            let key = self.key(&mut target)?;
            match joined.get_mut(&key) {
                Some(existing) => existing.merge(target),
                None => {
                    order.push(key.clone());
                    joined.insert(key, target);
                }
            }
        }
        Ok(order.into_iter().filter_map(|key| joined.remove(&key)).collect())
    }
}
