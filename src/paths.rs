use std::env;
use std::path::PathBuf;

const DATA_DIR_ENV: &str = "LAPWATCH_DIR";
const APP_DIR: &str = "lapwatch";

/// Picks the directory holding the ledger and settings: the CLI flag wins,
/// then `LAPWATCH_DIR`, then the platform data directory.
pub fn resolve_data_dir(cli_path: Option<PathBuf>) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env::var_os(DATA_DIR_ENV) {
		let path = PathBuf::from(path);
		if !path.as_os_str().is_empty() {
			return absolutize(path);
		}
	}

	default_data_dir()
}

fn default_data_dir() -> PathBuf {
	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = env::var_os("XDG_DATA_HOME") {
		if !path.is_empty() {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path)
			.join(".local")
			.join("share")
			.join(APP_DIR);
	}

	PathBuf::from(format!(".{APP_DIR}"))
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		return path;
	}

	match env::current_dir() {
		Ok(cwd) => cwd.join(path),
		Err(_) => path,
	}
}
