use std::path::PathBuf;

// Config lookup order: configs/ in the working directory, then /etc.

pub const LOCAL_CONFIG_FILE: &str = "configs/face-attendance.toml";

pub const DEV_DATA_DIR: &str = "./dev_data";

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/face-attendance/face-attendance.toml")
}

pub fn system_models_dir() -> PathBuf {
    PathBuf::from("/usr/share/face-attendance/models")
}
