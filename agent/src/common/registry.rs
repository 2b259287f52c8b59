use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use common::error::{Error, Result};

use crate::relabel::builtin::{JoinByHost, Passthrough, SplitLabel};
use crate::relabel::transform::Transformation;

pub type Params = BTreeMap<String, String>;
pub type BuildFn = Arc<dyn Fn(&Params) -> Result<Box<dyn Transformation>> + Send + Sync>;

type ParsedName = Vec<String>;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z][0-9A-Za-z_]*$").unwrap();
}

/// A named way to build a transformation from its configured parameters.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub build: BuildFn,
}

impl Registration {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Params) -> Result<Box<dyn Transformation>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("name", &self.name).finish()
    }
}

/// Transformations selectable from configuration, keyed by name.
#[derive(Debug, Default)]
pub struct Registry {
    registered: HashMap<String, Registration>,
    parsed_names: HashMap<String, ParsedName>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in [
            Registration::new(Passthrough::NAME, |params| Ok(Box::new(Passthrough::from_params(params)?) as _)),
            Registration::new(SplitLabel::NAME, |params| Ok(Box::new(SplitLabel::from_params(params)?) as _)),
            Registration::new(JoinByHost::NAME, |params| Ok(Box::new(JoinByHost::from_params(params)?) as _)),
        ] {
            // Built-in names are valid and distinct.
            if let Err(err) = registry.register(registration) {
                unreachable!("registering built-in transformation: {}", err);
            }
        }
        registry
    }

    pub fn register(&mut self, r: Registration) -> Result<()> {
        if self.registered.contains_key(&r.name) {
            return Err(Error::AlreadyRegistered(format!("transformation {}", r.name)));
        }
        let parsed = parse_component_name(&r.name)?;
        self.parsed_names.insert(r.name.clone(), parsed);
        self.registered.insert(r.name.clone(), r);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.registered.get(name)
    }

    pub fn build(&self, name: &str, params: &Params) -> Result<Arc<dyn Transformation>> {
        let registration = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("transformation {:?} is not registered", name)))?;
        let transformation = (registration.build)(params)?;
        Ok(Arc::from(transformation))
    }

    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registered.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Splits a dotted name into identifiers, rejecting empty or invalid parts.
pub fn parse_component_name(name: &str) -> Result<Vec<String>> {
    if name.is_empty() {
        return Err(Error::InvalidArguments("missing name".to_string()));
    }
    let parts: Vec<&str> = name.split('.').collect();
    for part in &parts {
        if part.is_empty() {
            return Err(Error::InvalidArguments(format!("found empty identifier in {:?}", name)));
        }
        if !IDENTIFIER_RE.is_match(part) {
            return Err(Error::InvalidArguments(format!("identifier {:?} is not valid", part)));
        }
    }
    Ok(parts.iter().map(|s| s.to_string()).collect())
}
