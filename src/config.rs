use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::classify::{
    FallThresholds, DEFAULT_DIRECTIONAL_THRESHOLD, DEFAULT_HEAD_LOW_THRESHOLD,
    DEFAULT_SPEED_THRESHOLD, DEFAULT_TILT_THRESHOLD_DEG,
};
use crate::event::EventIdentity;
use crate::kinematics::DEFAULT_MIN_DT_SECS;
use crate::window::DEFAULT_WINDOW_LEN;

const DEFAULT_DEVICE_ID: &str = "gd001";
const DEFAULT_LOCATION: &str = "Sangenjaya, Tokyo";
const DEFAULT_SOURCE: &str = "stub://fall";
const DEFAULT_HORIZONTAL_WEIGHT: f64 = 1.8;
const DEFAULT_CONSISTENT_FRAMES: u32 = 2;
const DEFAULT_COOLDOWN_SECS: f64 = 30.0;
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_AUDIO_PROGRAM: &str = "python3";
const DEFAULT_AUDIO_SCRIPT: &str = "audio.py";
const DEFAULT_EVENT_ID_ENV: &str = "EVENT_ID";
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "guardian";

#[derive(Debug, Deserialize, Default)]
struct GuardianConfigFile {
    device_id: Option<String>,
    location: Option<String>,
    source: Option<String>,
    detector: Option<DetectorConfigFile>,
    notify: Option<NotifyConfigFile>,
    audio: Option<AudioConfigFile>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    speed_threshold: Option<f64>,
    horizontal_weight: Option<f64>,
    directional_threshold: Option<f64>,
    head_low_threshold: Option<f64>,
    tilt_threshold_deg: Option<f64>,
    consistent_frames: Option<u32>,
    window_len: Option<usize>,
    cooldown_secs: Option<f64>,
    min_dt_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AudioConfigFile {
    enabled: Option<bool>,
    command: Option<Vec<String>>,
    event_id_env: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    host: Option<String>,
    port: Option<u16>,
    topic_prefix: Option<String>,
    client_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GuardianConfig {
    pub device_id: String,
    pub location: String,
    pub source: String,
    pub detector: DetectorSettings,
    pub notify: NotifySettings,
    pub audio: AudioSettings,
    pub mqtt: Option<MqttSettings>,
}

/// Tuning knobs for the detection core.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub speed_threshold: f64,
    pub horizontal_weight: f64,
    pub directional_threshold: f64,
    pub head_low_threshold: f64,
    pub tilt_threshold_deg: f64,
    pub consistent_frames: u32,
    pub window_len: usize,
    pub cooldown: Duration,
    pub min_dt_secs: f64,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub enabled: bool,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub event_id_env: String,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    /// Defaults to `guardian_<device_id>` once overrides are applied.
    pub client_id: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            speed_threshold: DEFAULT_SPEED_THRESHOLD,
            horizontal_weight: DEFAULT_HORIZONTAL_WEIGHT,
            directional_threshold: DEFAULT_DIRECTIONAL_THRESHOLD,
            head_low_threshold: DEFAULT_HEAD_LOW_THRESHOLD,
            tilt_threshold_deg: DEFAULT_TILT_THRESHOLD_DEG,
            consistent_frames: DEFAULT_CONSISTENT_FRAMES,
            window_len: DEFAULT_WINDOW_LEN,
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
            min_dt_secs: DEFAULT_MIN_DT_SECS,
        }
    }
}

impl DetectorSettings {
    pub fn thresholds(&self) -> FallThresholds {
        FallThresholds {
            speed: self.speed_threshold,
            directional: self.directional_threshold,
            head_low: self.head_low_threshold,
            tilt_rate_deg: self.tilt_threshold_deg,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("horizontal_weight", self.horizontal_weight),
            ("directional_threshold", self.directional_threshold),
            ("head_low_threshold", self.head_low_threshold),
            ("tilt_threshold_deg", self.tilt_threshold_deg),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("detector.{} must be finite and >= 0", name));
            }
        }
        if !self.speed_threshold.is_finite() || self.speed_threshold <= 0.0 {
            return Err(anyhow!("detector.speed_threshold must be finite and > 0"));
        }
        if self.consistent_frames == 0 {
            return Err(anyhow!("detector.consistent_frames must be >= 1"));
        }
        if self.window_len == 0 {
            return Err(anyhow!("detector.window_len must be >= 1"));
        }
        if self.cooldown.is_zero() {
            return Err(anyhow!("detector.cooldown_secs must be greater than zero"));
        }
        if !self.min_dt_secs.is_finite() || self.min_dt_secs <= 0.0 {
            return Err(anyhow!("detector.min_dt_secs must be finite and > 0"));
        }
        Ok(())
    }
}

impl GuardianConfig {
    /// Load from `GUARDIAN_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GUARDIAN_CONFIG").ok();
        let config_path = config_path.as_deref().filter(|p| !p.trim().is_empty());
        Self::load_from(config_path.map(Path::new))
    }

    /// Load from an explicit file (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.fill_derived();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity::new(self.device_id.clone(), self.location.clone())
    }

    fn from_file(file: GuardianConfigFile) -> Result<Self> {
        let defaults = DetectorSettings::default();
        let det = file.detector.unwrap_or_default();
        let cooldown = match det.cooldown_secs {
            Some(secs) => parse_cooldown(secs)?,
            None => defaults.cooldown,
        };
        let detector = DetectorSettings {
            speed_threshold: det.speed_threshold.unwrap_or(defaults.speed_threshold),
            horizontal_weight: det.horizontal_weight.unwrap_or(defaults.horizontal_weight),
            directional_threshold: det
                .directional_threshold
                .unwrap_or(defaults.directional_threshold),
            head_low_threshold: det.head_low_threshold.unwrap_or(defaults.head_low_threshold),
            tilt_threshold_deg: det.tilt_threshold_deg.unwrap_or(defaults.tilt_threshold_deg),
            consistent_frames: det.consistent_frames.unwrap_or(defaults.consistent_frames),
            window_len: det.window_len.unwrap_or(defaults.window_len),
            cooldown,
            min_dt_secs: det.min_dt_secs.unwrap_or(defaults.min_dt_secs),
        };

        let notify = NotifySettings {
            url: file.notify.as_ref().and_then(|n| n.url.clone()),
            timeout: Duration::from_secs(
                file.notify
                    .as_ref()
                    .and_then(|n| n.timeout_secs)
                    .unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
            ),
        };

        let audio_file = file.audio.unwrap_or_default();
        let audio = AudioSettings {
            enabled: audio_file.enabled.unwrap_or(true),
            command: audio_file.command.unwrap_or_else(|| {
                vec![
                    DEFAULT_AUDIO_PROGRAM.to_string(),
                    DEFAULT_AUDIO_SCRIPT.to_string(),
                ]
            }),
            event_id_env: audio_file
                .event_id_env
                .unwrap_or_else(|| DEFAULT_EVENT_ID_ENV.to_string()),
        };

        let mqtt = file.mqtt.and_then(|m| {
            let host = m.host?;
            Some(MqttSettings {
                host,
                port: m.port.unwrap_or(DEFAULT_MQTT_PORT),
                topic_prefix: m
                    .topic_prefix
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
                client_id: m.client_id.unwrap_or_default(),
            })
        });

        Ok(Self {
            location: file
                .location
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            device_id: file
                .device_id
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
            detector,
            notify,
            audio,
            mqtt,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device_id) = std::env::var("GUARDIAN_DEVICE_ID") {
            if !device_id.trim().is_empty() {
                self.device_id = device_id.trim().to_string();
            }
        }
        if let Ok(location) = std::env::var("GUARDIAN_LOCATION") {
            if !location.trim().is_empty() {
                self.location = location;
            }
        }
        if let Ok(source) = std::env::var("GUARDIAN_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(url) = std::env::var("GUARDIAN_NOTIFY_URL") {
            if !url.trim().is_empty() {
                self.notify.url = Some(url.trim().to_string());
            }
        }
        if let Ok(cooldown) = std::env::var("GUARDIAN_COOLDOWN_SECS") {
            if !cooldown.trim().is_empty() {
                let secs: f64 = cooldown.trim().parse().map_err(|_| {
                    anyhow!("GUARDIAN_COOLDOWN_SECS must be a number of seconds")
                })?;
                self.detector.cooldown = parse_cooldown(secs)?;
            }
        }
        if let Ok(command) = std::env::var("GUARDIAN_AUDIO_COMMAND") {
            let argv = split_argv(&command);
            if argv.is_empty() {
                self.audio.enabled = false;
            } else {
                self.audio.command = argv;
                self.audio.enabled = true;
            }
        }
        if let Ok(host) = std::env::var("GUARDIAN_MQTT_HOST") {
            if !host.trim().is_empty() {
                let host = host.trim().to_string();
                match self.mqtt.as_mut() {
                    Some(mqtt) => mqtt.host = host,
                    None => {
                        self.mqtt = Some(MqttSettings {
                            host,
                            port: DEFAULT_MQTT_PORT,
                            topic_prefix: DEFAULT_MQTT_TOPIC_PREFIX.to_string(),
                            client_id: String::new(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Fill defaults that depend on other, possibly overridden, fields.
    fn fill_derived(&mut self) {
        let device_id = &self.device_id;
        if let Some(mqtt) = self.mqtt.as_mut() {
            if mqtt.client_id.trim().is_empty() {
                mqtt.client_id = format!("guardian_{}", device_id);
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        validate_device_id(&self.device_id)?;
        if self.location.trim().is_empty() {
            return Err(anyhow!("location must not be empty"));
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        self.detector.validate()?;

        if let Some(url) = &self.notify.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow!("notify.url must be an http(s) URL, got '{}'", url));
            }
        }
        if self.notify.timeout.is_zero() {
            return Err(anyhow!("notify.timeout_secs must be greater than zero"));
        }
        if self.audio.enabled && self.audio.command.is_empty() {
            return Err(anyhow!("audio.command must name a program when audio is enabled"));
        }
        if self.audio.event_id_env.trim().is_empty() {
            return Err(anyhow!("audio.event_id_env must not be empty"));
        }
        if let Some(mqtt) = &self.mqtt {
            if mqtt.host.trim().is_empty() {
                return Err(anyhow!("mqtt.host must not be empty"));
            }
            if mqtt.topic_prefix.trim().is_empty() || mqtt.topic_prefix.contains(['#', '+']) {
                return Err(anyhow!("mqtt.topic_prefix must be a plain, non-empty topic"));
            }
        }
        Ok(())
    }
}

/// Device ids travel in payloads and MQTT topics, so keep them to a safe alphabet.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    static DEVICE_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_ID_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());
    if !re.is_match(device_id) {
        return Err(anyhow!("device_id must match ^[A-Za-z0-9_-]{{1,64}}$"));
    }
    Ok(())
}

fn parse_cooldown(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("cooldown must be a non-negative number of seconds"))
}

fn read_config_file(path: &Path) -> Result<GuardianConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_argv(value: &str) -> Vec<String> {
    value.split_whitespace().map(|s| s.to_string()).collect()
}
