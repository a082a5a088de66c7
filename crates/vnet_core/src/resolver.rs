//! Variable resolution chains.
//!
//! Every stage variable is resolved through an explicit, ordered [`Chain`]
//! of sources. The first source that yields a value wins:
//!
//! ```rust,ignore
//! let rg_name = resolver
//!     .var(Stage::Vnet, "resource_group_name")
//!     .env("RESOURCE_GROUP_NAME")
//!     .output(Stage::ResourceGroup, "resource_group_name")
//!     .required()
//!     .await?;
//! ```
//!
//! Deploy and destroy share these chains, so both flows always agree on
//! where a value comes from.

use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use vnet_iac::{value_to_string, OutputResolver, TfVars};

use crate::env::{parse_bool, parse_csv, Environment};
use crate::error::{ProvisionError, ProvisionResult};
use crate::stage::{ProjectLayout, Stage};

/// How an environment string is converted into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    Str,
    Int,
    Float,
    Bool,
    List,
}

impl EnvKind {
    /// Convert a raw environment string; `None` when it does not parse.
    pub fn convert(&self, raw: &str) -> Option<Value> {
        match self {
            EnvKind::Str => Some(Value::String(raw.to_string())),
            EnvKind::Int => raw.trim().parse::<i64>().ok().map(Value::from),
            EnvKind::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            EnvKind::Bool => parse_bool(raw).map(Value::Bool),
            EnvKind::List => {
                let items = parse_csv(raw);
                if items.is_empty() {
                    None
                } else {
                    Some(Value::from(items))
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Link {
    Env { var: String, kind: EnvKind },
    Persisted { stage: Stage, key: String },
    Output { stage: Stage, name: String },
    Fixed(Value),
}

impl Link {
    fn describe(&self) -> String {
        match self {
            Link::Env { var, .. } => format!("env {}", var),
            Link::Persisted { stage, key } => format!("{} in {}", key, stage.dir_name()),
            Link::Output { stage, name } => format!("output {} of {}", name, stage),
            Link::Fixed(_) => "default".to_string(),
        }
    }
}

/// Shared resolution context for all stages.
pub struct Resolver<'a> {
    env: &'a Environment,
    layout: &'a ProjectLayout,
    outputs: &'a OutputResolver,
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a Environment, layout: &'a ProjectLayout, outputs: &'a OutputResolver) -> Self {
        Self {
            env,
            layout,
            outputs,
        }
    }

    pub fn env(&self) -> &Environment {
        self.env
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.layout
    }

    pub fn outputs(&self) -> &OutputResolver {
        self.outputs
    }

    /// Start a resolution chain for `name` in `stage`.
    pub fn var(&self, stage: Stage, name: impl Into<String>) -> Chain<'_> {
        Chain {
            resolver: self,
            stage,
            name: name.into(),
            links: Vec::new(),
        }
    }

    /// Value previously written to a stage's tfvars file.
    ///
    /// An unreadable file is logged and treated as holding nothing.
    pub fn persisted(&self, stage: Stage, key: &str) -> Option<Value> {
        match self.persisted_checked(stage, key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable {:?}: {}", self.layout.tfvars_path(stage), e);
                None
            }
        }
    }

    /// Like [`persisted`](Self::persisted), but a tfvars file that exists
    /// and cannot be parsed is an error.
    pub fn persisted_checked(&self, stage: Stage, key: &str) -> ProvisionResult<Option<Value>> {
        let vars = TfVars::read(&self.layout.tfvars_path(stage))?;
        Ok(vars.and_then(|vars| {
            vars.get(key)
                .filter(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
        }))
    }

    /// String environment value, or the given default.
    pub fn env_or(&self, var: &str, default: &str) -> String {
        self.env.get(var).unwrap_or(default).to_string()
    }

    /// Location shared by every regional stage.
    pub fn location(&self) -> String {
        self.env_or("LOCATION", crate::variables::defaults::LOCATION)
    }

    /// Resource tags with `TAG_*` overrides applied.
    pub fn tags(&self) -> Value {
        let mut tags = Map::new();
        for (key, env_var, default) in crate::variables::defaults::TAGS {
            tags.insert(key.to_string(), Value::from(self.env_or(env_var, default)));
        }
        Value::Object(tags)
    }
}

/// Ordered list of sources for one variable.
pub struct Chain<'r> {
    resolver: &'r Resolver<'r>,
    stage: Stage,
    name: String,
    links: Vec<Link>,
}

impl<'r> Chain<'r> {
    fn link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Environment variable taken verbatim.
    pub fn env(self, var: impl Into<String>) -> Self {
        self.env_as(var, EnvKind::Str)
    }

    pub fn env_int(self, var: impl Into<String>) -> Self {
        self.env_as(var, EnvKind::Int)
    }

    pub fn env_float(self, var: impl Into<String>) -> Self {
        self.env_as(var, EnvKind::Float)
    }

    pub fn env_bool(self, var: impl Into<String>) -> Self {
        self.env_as(var, EnvKind::Bool)
    }

    /// Comma-separated environment list.
    pub fn env_list(self, var: impl Into<String>) -> Self {
        self.env_as(var, EnvKind::List)
    }

    pub fn env_as(self, var: impl Into<String>, kind: EnvKind) -> Self {
        self.link(Link::Env {
            var: var.into(),
            kind,
        })
    }

    /// The variable's own value in this stage's existing tfvars file.
    pub fn persisted(self) -> Self {
        let (stage, key) = (self.stage, self.name.clone());
        self.link(Link::Persisted { stage, key })
    }

    /// A value persisted in another stage's tfvars file.
    pub fn persisted_from(self, stage: Stage, key: impl Into<String>) -> Self {
        self.link(Link::Persisted {
            stage,
            key: key.into(),
        })
    }

    /// An output of another (earlier) stage.
    pub fn output(self, stage: Stage, name: impl Into<String>) -> Self {
        self.link(Link::Output {
            stage,
            name: name.into(),
        })
    }

    /// Fixed fallback value.
    pub fn or(self, value: impl Into<Value>) -> Self {
        self.link(Link::Fixed(value.into()))
    }

    /// First value produced by the chain.
    pub async fn first(&self) -> ProvisionResult<Option<Value>> {
        for link in &self.links {
            if let Some(value) = self.evaluate(link).await? {
                debug!("{}.{} resolved from {}", self.stage, self.name, link.describe());
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Resolved value, or `null` when no source has one.
    pub async fn optional(self) -> ProvisionResult<Value> {
        Ok(self.first().await?.unwrap_or(Value::Null))
    }

    /// Resolved value as a string, if any.
    pub async fn optional_string(self) -> ProvisionResult<Option<String>> {
        Ok(self.first().await?.map(|v| value_to_string(&v)))
    }

    /// Resolved value; errors naming the stage and variable when absent.
    pub async fn required(self) -> ProvisionResult<Value> {
        match self.first().await? {
            Some(value) => Ok(value),
            None => Err(self.missing()),
        }
    }

    pub async fn required_string(self) -> ProvisionResult<String> {
        self.required().await.map(|v| value_to_string(&v))
    }

    fn missing(&self) -> ProvisionError {
        let sources: Vec<String> = self.links.iter().map(Link::describe).collect();
        ProvisionError::MissingValue {
            stage: self.stage.to_string(),
            variable: self.name.clone(),
            sources: if sources.is_empty() {
                "no sources".to_string()
            } else {
                sources.join(", ")
            },
        }
    }

    async fn evaluate(&self, link: &Link) -> ProvisionResult<Option<Value>> {
        let resolver = self.resolver;
        Ok(match link {
            Link::Env { var, kind } => resolver.env.get(var).and_then(|raw| {
                let converted = kind.convert(raw);
                if converted.is_none() {
                    warn!("Ignoring {}={:?}: not a valid {:?}", var, raw, kind);
                }
                converted
            }),
            Link::Persisted { stage, key } => resolver.persisted(*stage, key),
            Link::Output { stage, name } => {
                let dir = resolver.layout.stage_dir(*stage);
                resolver.outputs.output(&dir, name).await?
            }
            Link::Fixed(value) => Some(value.clone()),
        })
    }
}
