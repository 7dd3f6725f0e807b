//! Browser environment probing.

/// Source of the browser details sent with the first event of a visit.
pub trait EnvironmentProbe: Send + Sync {
    /// Screen size as `<width>x<height>`
    fn screen_resolution(&self) -> String;

    /// Bits per pixel
    fn color_depth(&self) -> i64;

    /// Java version, or `yes`/`no` when only presence is known
    fn java_version(&self) -> String;

    /// Flash plugin version, `no` when absent. May be slow; the sensor
    /// caches the answer in a cookie.
    fn flash_version(&self) -> String;
}

/// Fixed environment values.
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    pub resolution: String,
    pub color_depth: i64,
    pub java: String,
    pub flash: String,
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self {
            resolution: String::new(),
            color_depth: 0,
            java: "no".to_string(),
            flash: "no".to_string(),
        }
    }
}

impl EnvironmentProbe for StaticEnvironment {
    fn screen_resolution(&self) -> String {
        self.resolution.clone()
    }

    fn color_depth(&self) -> i64 {
        self.color_depth
    }

    fn java_version(&self) -> String {
        self.java.clone()
    }

    fn flash_version(&self) -> String {
        self.flash.clone()
    }
}
