use std::path::Path;

use swfm_sync::adapters::db::{
    insert_station, list_active_stations, open_connection, run_migrations, schema_version,
};

fn main() {
    if let Err(error) = run() {
        eprintln!("failed to create test db: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut path = if cfg!(windows) {
        ".\\data\\swfm_test.db".to_string()
    } else {
        "./data/swfm_test.db".to_string()
    };
    let mut force = false;
    let mut stations: Vec<(String, String)> = Vec::new();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--path" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--path requires a value".to_string());
                };
                path = value.clone();
                index += 2;
            }
            "--station" => {
                let Some(value) = args.get(index + 1) else {
                    return Err("--station requires a value".to_string());
                };
                stations.push(parse_station_arg(value)?);
                index += 2;
            }
            "--force" => {
                force = true;
                index += 1;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    let path_ref = Path::new(&path);
    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|error| format!("failed to create parent directory: {error}"))?;
    }

    if force && path_ref.exists() {
        std::fs::remove_file(path_ref)
            .map_err(|error| format!("failed to remove existing db file: {error}"))?;
    }

    let mut connection = open_connection(&path).map_err(|error| error.to_string())?;
    run_migrations(&mut connection).map_err(|error| error.to_string())?;
    let version = schema_version(&connection).map_err(|error| error.to_string())?;

    for (code, name) in &stations {
        insert_station(&connection, code, name)
            .map_err(|error| format!("failed to seed station {code}: {error}"))?;
    }
    let active = list_active_stations(&connection).map_err(|error| error.to_string())?;

    println!("created/updated test db at: {path}");
    println!("schema version: {version}");
    println!("active stations: {}", active.len());
    println!("use STORE_URL=sqlite://{path}");
    Ok(())
}

fn parse_station_arg(value: &str) -> Result<(String, String), String> {
    let (code, name) = value.split_once('=').unwrap_or((value, value));
    let code = code.trim();
    if code.is_empty() {
        return Err(format!("invalid --station value: {value}"));
    }
    let name = if name.trim().is_empty() { code } else { name.trim() };
    Ok((code.to_string(), name.to_string()))
}

fn print_help() {
    println!("create_test_db");
    println!();
    println!("Usage:");
    println!(
        "  cargo run --bin create_test_db -- [--path <file>] [--station <CODE=Name>]... [--force]"
    );
    println!();
    println!("Options:");
    println!("  --path <file>          target sqlite file (default: ./data/swfm_test.db)");
    println!("  --station <CODE=Name>  seed an active station; may be repeated");
    println!("  --force                delete existing file before creating");
}
