//! pg_dump / pg_restore command lines for each migration phase.

use std::ffi::OsString;
use std::path::Path;

use crate::config::{Config, EndpointConfig};
use crate::orchestrator::Phase;

use super::ToolInvocation;

/// `pg_dump` of the source schema into a directory archive.
pub fn schema_dump(config: &Config, dump_dir: &Path) -> ToolInvocation {
    let inv = ToolInvocation::new(Phase::DumpingSchema, &config.tools.pg_dump)
        .arg("--format=directory")
        .arg_if(config.migration.no_owner, "--no-owner")
        .arg_if(config.migration.no_acl, "--no-acl")
        .arg("--schema-only")
        .arg(dbname_arg(&config.source))
        .arg(file_arg(dump_dir));
    with_password(inv, &config.source)
}

/// `pg_restore` of the schema archive into the destination.
pub fn schema_restore(config: &Config, dump_dir: &Path) -> ToolInvocation {
    let inv = ToolInvocation::new(Phase::RestoringSchema, &config.tools.pg_restore)
        .arg("--clean")
        .arg("--if-exists")
        .arg(format!("--jobs={}", config.migration.get_jobs()))
        .arg_if(config.migration.no_owner, "--no-owner")
        .arg_if(config.migration.no_acl, "--no-acl")
        .arg("--schema-only")
        .arg(dbname_arg(&config.destination))
        .arg(dump_dir);
    with_password(inv, &config.destination)
}

/// Parallel `pg_dump` of the source data. pg_dump creates `dump_dir` itself.
pub fn data_dump(config: &Config, dump_dir: &Path) -> ToolInvocation {
    let inv = ToolInvocation::new(Phase::DumpingData, &config.tools.pg_dump)
        .arg("--format=directory")
        .arg_if(config.migration.no_owner, "--no-owner")
        .arg_if(config.migration.no_acl, "--no-acl")
        .arg("--data-only")
        .arg(format!("--jobs={}", config.migration.get_jobs()))
        .arg(dbname_arg(&config.source))
        .arg(file_arg(dump_dir));
    with_password(inv, &config.source)
}

/// `pg_restore` of the data archive with triggers disabled.
///
/// With `single_transaction` the restore runs in one session and is atomic;
/// pg_restore refuses `--jobs` in that mode, so it is left out.
pub fn data_restore(config: &Config, dump_dir: &Path) -> ToolInvocation {
    let inv = ToolInvocation::new(Phase::RestoringData, &config.tools.pg_restore)
        .arg("--disable-triggers");
    let inv = if config.migration.single_transaction {
        inv.arg("--single-transaction")
    } else {
        inv.arg(format!("--jobs={}", config.migration.get_jobs()))
    };
    let inv = inv
        .arg_if(config.migration.no_owner, "--no-owner")
        .arg_if(config.migration.no_acl, "--no-acl")
        .arg("--data-only")
        .arg(dbname_arg(&config.destination))
        .arg(dump_dir);
    with_password(inv, &config.destination)
}

fn dbname_arg(endpoint: &EndpointConfig) -> String {
    format!("--dbname={}", endpoint.connection_string())
}

fn file_arg(dump_dir: &Path) -> OsString {
    let mut arg = OsString::from("--file=");
    arg.push(dump_dir.as_os_str());
    arg
}

fn with_password(inv: ToolInvocation, endpoint: &EndpointConfig) -> ToolInvocation {
    if endpoint.password.is_empty() {
        inv
    } else {
        inv.env("PGPASSWORD", endpoint.password.clone())
    }
}
