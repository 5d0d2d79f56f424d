use std::{collections::HashMap, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use hocon::{Hocon, HoconLoader};
use log::debug;

use super::FsExt;

/// Reads options from a HOCON file. Lookups check the environment first, then the configured scope
/// of the file and finally the root of the file, so a shared key such as `root_path` can live at the
/// top level while loop specific keys live under `self_learn { ... }`.
#[derive(Debug)]
pub struct ConfigLoader {
    hocon: Hocon,
    env: HashMap<String, String>,
    scope: String,
}

impl ConfigLoader {
    pub fn new(path: impl AsRef<Path>, scope: String) -> Result<Self> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(anyhow!("The config file {:?} was not found", path));
        }

        let hocon = HoconLoader::new()
            .load_file(path)
            .with_context(|| format!("Failed to find or load config file at: {:?}", path))?
            .hocon()
            .with_context(|| format!("Failed to parse config file at: {:?}", path))?;

        debug!("Loaded config {:?} with scope {}", path, scope);

        Ok(Self::from_hocon(hocon, scope))
    }

    pub fn parse(contents: &str, scope: String) -> Result<Self> {
        let hocon = HoconLoader::new()
            .load_str(contents)
            .context("Failed to load config")?
            .hocon()
            .context("Failed to parse config")?;

        Ok(Self::from_hocon(hocon, scope))
    }

    fn from_hocon(hocon: Hocon, scope: String) -> Self {
        let env = std::env::vars().collect::<HashMap<_, _>>();

        Self { hocon, env, scope }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.env.get(name) {
            return Some(Value::String(value.clone()));
        }

        let scope = &self.hocon[self.scope.as_str()];
        if matches!(scope, Hocon::Hash(_)) {
            if let Some(value) = Self::map_hocon(scope, name) {
                return Some(value);
            }
        }

        Self::map_hocon(&self.hocon, name)
    }

    /// Resolves a path valued option relative to the current working directory.
    pub fn get_relative_path(&self, name: &str) -> Result<PathBuf> {
        let path = self
            .get(name)
            .and_then(|v| v.as_string())
            .with_context(|| format!("Config value {} must be set to a path", name))?;

        path.relative_to_cwd()
    }

    pub fn get_usize(&self, name: &str) -> Result<Option<usize>> {
        self.get_as(name, "a non negative integer", Value::as_usize)
    }

    pub fn get_u64(&self, name: &str) -> Result<Option<u64>> {
        self.get_as(name, "a non negative integer", Value::as_u64)
    }

    pub fn get_f32(&self, name: &str) -> Result<Option<f32>> {
        self.get_as(name, "a number", Value::as_f32)
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        self.get_as(name, "a boolean", Value::as_bool)
    }

    pub fn get_string(&self, name: &str) -> Result<Option<String>> {
        self.get_as(name, "a string", Value::as_string)
    }

    /// `None` when `name` is absent. A value that is present but cannot be converted is an error.
    fn get_as<T>(
        &self,
        name: &str,
        expected: &str,
        convert: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        self.get(name)
            .map(|value| {
                convert(&value).ok_or_else(|| {
                    anyhow!("Config value {} must be {} but was {:?}", name, expected, value)
                })
            })
            .transpose()
    }

    pub fn load<T: Config>(&self) -> Result<T> {
        let res = T::load(self)?;
        Ok(res)
    }

    fn map_hocon(hocon: &Hocon, name: &str) -> Option<Value> {
        match &hocon[name] {
            Hocon::Real(f64) => Some(Value::Float(*f64 as f32)),
            Hocon::Integer(i64) => Some(Value::Integer(*i64)),
            Hocon::String(string) => Some(Value::String(string.clone())),
            Hocon::Boolean(bool) => Some(Value::Boolean(*bool)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f32),
    Boolean(bool),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(val) => Some(*val),
            Value::String(val) => Hocon::String(val.clone()).as_bool(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Integer(val) => usize::try_from(*val).ok(),
            Value::String(val) => val.parse::<usize>().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(val) => u64::try_from(*val).ok(),
            Value::String(val) => val.parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(val) => Some(*val),
            Value::Integer(val) => Some(*val as f32),
            Value::String(val) => val.parse::<f32>().ok(),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(val) => Some(val.clone()),
            Value::Boolean(true) => Some("true".to_string()),
            Value::Boolean(false) => Some("false".to_string()),
            Value::Float(val) => Some(val.to_string()),
            Value::Integer(val) => Some(val.to_string()),
        }
    }
}

pub trait Config {
    fn load(config: &ConfigLoader) -> Result<Self>
    where
        Self: Sized;
}
