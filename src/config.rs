use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Labtrail";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Labtrail")
}

/// Default on-disk location of the workflow database
pub fn database_path() -> PathBuf {
    app_data_dir().join("labtrail.db")
}

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> &'static str {
    "info,labtrail=debug"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Labtrail"));
    }

    #[test]
    fn database_path_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("labtrail.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
