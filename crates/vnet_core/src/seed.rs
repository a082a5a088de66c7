//! Database seeding with `sqlcmd` after the SQL stage applies.

use std::path::PathBuf;

use tracing::info;

use vnet_iac::{value_to_string, OutputResolver};
use vnet_runner::{find_program, CommandRunner, CommandSpec};

use crate::env::Environment;
use crate::error::{ProvisionError, ProvisionResult};
use crate::stage::{ProjectLayout, Stage};

/// Environment variable pointing at a specific `sqlcmd` executable.
pub const SQLCMD_PATH_VAR: &str = "SQLCMD_PATH";

/// Install locations checked when `sqlcmd` is not on `PATH`.
pub const SQLCMD_FALLBACK_PATHS: [&str; 4] = [
    r"C:\Program Files\Microsoft SQL Server\Client SDK\ODBC\180\Tools\Binn\sqlcmd.exe",
    r"C:\Program Files\Microsoft SQL Server\Client SDK\ODBC\170\Tools\Binn\sqlcmd.exe",
    r"C:\Program Files (x86)\Microsoft SQL Server\Client SDK\ODBC\180\Tools\Binn\sqlcmd.exe",
    r"C:\Program Files (x86)\Microsoft SQL Server\Client SDK\ODBC\170\Tools\Binn\sqlcmd.exe",
];

/// SQL login used to run the seed script.
#[derive(Clone)]
pub struct SqlLogin {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for SqlLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlLogin")
            .field("login", &self.login)
            .field("password", &vnet_runner::REDACTED)
            .finish()
    }
}

/// Locate `sqlcmd`: `SQLCMD_PATH`, then `PATH`, then known install locations.
pub fn find_sqlcmd(env: &Environment) -> Option<PathBuf> {
    if let Some(path) = env.get(SQLCMD_PATH_VAR) {
        return find_program(path, &[]);
    }
    find_program("sqlcmd", &SQLCMD_FALLBACK_PATHS)
}

/// Run the project's seed script against the deployed database.
pub async fn run_sql_seed(
    runner: &dyn CommandRunner,
    outputs: &OutputResolver,
    layout: &ProjectLayout,
    env: &Environment,
    credentials: &SqlLogin,
) -> ProvisionResult<()> {
    let sqlcmd = find_sqlcmd(env).ok_or(ProvisionError::SeedToolNotFound)?;
    let script = layout.seed_script();
    if !script.is_file() {
        return Err(ProvisionError::SeedScriptNotFound(script));
    }

    let sql_dir = layout.stage_dir(Stage::Sql);
    let fqdn = value_to_string(&outputs.require(&sql_dir, "sql_server_fqdn").await?);
    let database = value_to_string(&outputs.require(&sql_dir, "sql_database_name").await?);

    info!("Seeding database {} on {}", database, fqdn);
    let spec = CommandSpec::new(sqlcmd.display().to_string())
        .args(["-S", fqdn.as_str(), "-d", database.as_str(), "-U", credentials.login.as_str(), "-P"])
        .secret_arg(credentials.password.as_str())
        .arg("-i")
        .arg(script.display().to_string())
        .envs(env.file_exports());

    let result = runner.run(&spec).await?;
    if !result.success() {
        return Err(ProvisionError::CommandFailed {
            command: spec.display(),
            exit_code: result.exit_code,
        });
    }
    Ok(())
}
