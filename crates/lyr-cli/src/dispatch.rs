use std::path::Path;

use lyr_core::{
    Config, LayerError, LayerRecord, LayerRegistry, PackagedLayer, Reconciliation, Result,
};
use serde_json::{json, Value};

use crate::cli::LyrCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::UserError => "user-error",
            Self::Failure => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
    /// Print `message` verbatim, without status decoration.
    pub passthrough: bool,
}

impl Outcome {
    fn ok(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
            passthrough: false,
        }
    }

    fn from_error(err: &LayerError) -> Self {
        let status = match err {
            LayerError::Config(_) => CommandStatus::UserError,
            _ => CommandStatus::Failure,
        };
        Self {
            status,
            message: err.to_string(),
            details: json!({ "code": err.code() }),
            passthrough: false,
        }
    }

    pub fn to_json(&self) -> Value {
        let details = match &self.details {
            Value::Object(_) => self.details.clone(),
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };
        json!({
            "status": self.status.as_str(),
            "message": self.message,
            "details": details,
        })
    }
}

pub fn execute(config_path: Option<&Path>, command: &LyrCommand) -> Outcome {
    match run(config_path, command) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(command = command.name(), error = ?err, "command failed");
            Outcome::from_error(&err)
        }
    }
}

fn run(config_path: Option<&Path>, command: &LyrCommand) -> Result<Outcome> {
    let config = Config::load(config_path)?;
    match command {
        LyrCommand::Check => {
            let source = config.source()?;
            let outcome = config.reconciler(&source)?.check()?;
            Ok(check_outcome(config.supervisor().layer_name(), &outcome))
        }
        LyrCommand::Arn => {
            let source = config.source()?;
            let arn = config.reconciler(&source)?.latest_arn()?;
            Ok(Outcome {
                passthrough: true,
                ..Outcome::ok(arn.clone(), json!({ "arn": arn }))
            })
        }
        LyrCommand::List => Ok(list_outcome(&config.registry()?.list()?)),
        LyrCommand::Exists { name } => {
            let name = name.as_deref().unwrap_or(config.supervisor().layer_name());
            exists_outcome(&config.registry()?, name)
        }
        LyrCommand::Delete { name, version } => {
            let name = name.as_deref().unwrap_or(config.supervisor().layer_name());
            let deleted = config.registry()?.delete(name, *version)?;
            Ok(Outcome::ok(
                format!("deleted '{name}' version {deleted}"),
                json!({ "layer": name, "version": deleted }),
            ))
        }
        LyrCommand::Package { out } => {
            let source = config.source()?;
            let packaged = config.reconciler(&source)?.build(out)?;
            Ok(package_outcome(&packaged))
        }
    }
}

fn check_outcome(layer: &str, outcome: &Reconciliation) -> Outcome {
    let info = outcome.info();
    let description = info.description.as_deref().unwrap_or_default();
    let message = match outcome {
        Reconciliation::Created(_) => format!("created '{layer}' at {description}"),
        Reconciliation::Updated(_) => format!("updated '{layer}' to {description}"),
        Reconciliation::Current(_) => format!("'{layer}' is current at {description}"),
    };
    Outcome::ok(
        message,
        json!({
            "layer": layer,
            "state": outcome.state().as_ref(),
            "published": outcome.published(),
            "version": info.version,
            "supervisor": description,
            "arn": info.layer_version_arn,
        }),
    )
}

fn list_outcome(records: &[LayerRecord]) -> Outcome {
    let lines: Vec<String> = records
        .iter()
        .map(|record| {
            let latest = record.latest_matching_version.as_ref();
            format!(
                "{}\t{}\t{}",
                record.layer_name,
                latest.map_or_else(|| "-".to_string(), |info| info.version.to_string()),
                latest
                    .and_then(|info| info.description.as_deref())
                    .unwrap_or("-"),
            )
        })
        .collect();
    let message = if lines.is_empty() {
        "no layers published".to_string()
    } else {
        lines.join("\n")
    };
    Outcome {
        passthrough: true,
        ..Outcome::ok(message, json!({ "layers": records }))
    }
}

fn exists_outcome(registry: &LayerRegistry, name: &str) -> Result<Outcome> {
    if registry.exists(name)? {
        return Ok(Outcome::ok(
            format!("layer '{name}' exists"),
            json!({ "layer": name, "exists": true }),
        ));
    }
    Ok(Outcome {
        status: CommandStatus::UserError,
        message: format!("layer '{name}' does not exist"),
        details: json!({ "layer": name, "exists": false }),
        passthrough: false,
    })
}

fn package_outcome(packaged: &PackagedLayer) -> Outcome {
    Outcome::ok(
        format!(
            "wrote {} ({} files, {} bytes)",
            packaged.path.display(),
            packaged.entries,
            packaged.size
        ),
        json!({
            "path": packaged.path.display().to_string(),
            "entries": packaged.entries,
            "size": packaged.size,
            "sha256": packaged.sha256,
        }),
    )
}
