//! `configuration.yaml` loading with `!include`, `!secret` and `!env_var`

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

/// Tags expanded while loading. Anything else passes through untouched.
enum Tag {
    Include,
    Secret,
    EnvVar,
}

impl Tag {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "!include" => Some(Tag::Include),
            "!secret" => Some(Tag::Secret),
            "!env_var" => Some(Tag::EnvVar),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Tag::Include => "!include",
            Tag::Secret => "!secret",
            Tag::EnvVar => "!env_var",
        }
    }
}

pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files on the current include chain
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    /// Create a loader rooted at `config_dir`, reading its `secrets.yaml`
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self {
            config_dir,
            secrets,
            chain: Vec::new(),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load `path` (relative to the config directory) and expand its tags
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        if self.chain.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }
        debug!(path = %path.display(), depth = self.chain.len(), "Loading YAML");

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::read(&path, e))?;
        self.chain.push(path);
        let result = self.load_str(&content);
        self.chain.pop();
        result
    }

    fn load_str(&mut self, content: &str) -> ConfigResult<Value> {
        let raw: Value = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(self.current_file(), e))?;
        self.expand(raw)
    }

    fn current_file(&self) -> &Path {
        self.chain.last().map_or(self.config_dir.as_path(), |p| p.as_path())
    }

    fn expand(&mut self, value: Value) -> ConfigResult<Value> {
        Ok(match value {
            Value::Tagged(tagged) => self.expand_tagged(*tagged)?,
            Value::Sequence(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(|item| self.expand(item))
                    .collect::<ConfigResult<_>>()?,
            ),
            Value::Mapping(map) => {
                let mut expanded = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    expanded.insert(self.expand(key)?, self.expand(value)?);
                }
                Value::Mapping(expanded)
            }
            other => other,
        })
    }

    fn expand_tagged(&mut self, tagged: TaggedValue) -> ConfigResult<Value> {
        let Some(tag) = Tag::parse(&tagged.tag.to_string()) else {
            let value = self.expand(tagged.value)?;
            return Ok(Value::Tagged(Box::new(TaggedValue {
                tag: tagged.tag,
                value,
            })));
        };
        trace!(tag = tag.name(), "Expanding tag");

        let argument = match tagged.value {
            Value::String(s) => s,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: tag.name().to_string(),
                    reason: format!("expected a string argument, got {other:?}"),
                })
            }
        };

        match tag {
            Tag::Include => {
                let target = self.include_target(&argument);
                self.load_file(target)
            }
            Tag::Secret => {
                debug!(key = %argument, "Substituting secret");
                Ok(self.secrets.get(&argument)?.clone())
            }
            Tag::EnvVar => std::env::var(&argument)
                .map(Value::String)
                .map_err(|_| ConfigError::EnvVarNotFound { var: argument }),
        }
    }

    /// Includes resolve against the directory of the including file
    fn include_target(&self, argument: &str) -> PathBuf {
        let base = self.current_file().parent().unwrap_or(&self.config_dir);
        base.join(argument)
    }
}

/// Load `file` from `config_dir` with every tag expanded
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}
