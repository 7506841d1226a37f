use crate::backend::BackendLimits;

/// Environment variable that forces [`DeviceConfig::log_shader_source`].
pub const LOG_GLSL_ENV: &str = "WEBD3D_LOG_GLSL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Log the generated GLSL of every shader at `debug` level.
    pub log_shader_source: bool,
    /// Check framebuffer completeness after every render-target change.
    pub validate_framebuffers: bool,
    /// Lower the backend-reported limits (never raises them).
    pub limits: Option<BackendLimits>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            log_shader_source: false,
            validate_framebuffers: true,
            limits: None,
        }
    }
}

impl DeviceConfig {
    /// Applies environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if env_var_truthy(LOG_GLSL_ENV) {
            self.log_shader_source = true;
        }
        self
    }

    pub(crate) fn effective_limits(&self, reported: BackendLimits) -> BackendLimits {
        match self.limits {
            Some(cap) => reported.min(cap),
            None => reported,
        }
    }
}

pub(crate) fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };
    is_truthy(&raw)
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(is_truthy(v), "{v:?}");
        }
        for v in ["", "0", "false", "off", "2"] {
            assert!(!is_truthy(v), "{v:?}");
        }
    }

    #[test]
    fn limit_override_only_lowers() {
        let config = DeviceConfig {
            limits: Some(BackendLimits {
                max_texture_size: 4096,
                ..BackendLimits::WEBGL2_MINIMUM
            }),
            ..DeviceConfig::default()
        };
        let reported = BackendLimits {
            max_texture_size: 8192,
            max_draw_buffers: 8,
            ..BackendLimits::WEBGL2_MINIMUM
        };
        let limits = config.effective_limits(reported);
        assert_eq!(limits.max_texture_size, 4096);
        assert_eq!(limits.max_draw_buffers, 4);
    }
}
