use crate::logger::Logger;
use crate::vcs;
use ini::Ini;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the layered configuration files.
pub const CONFIG_FILE_NAME: &str = "configure.ini";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to read {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("Missing configuration key `{key}` in section [{section}]")]
    MissingKey {
        section: &'static str,
        key: &'static str,
    },
    #[error("Invalid value `{value}` for key `{key}` in section [{section}]")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
    #[error("Environment variable {name} is not set")]
    MissingEnvVar { name: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildVariant {
    Debug,
    Release,
}

impl BuildVariant {
    fn from_config(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "release" => Some(Self::Release),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    /// Suffix appended to the name of executables built in this variant.
    pub fn executable_suffix(self) -> &'static str {
        match self {
            Self::Debug => "_d",
            Self::Release => "",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPlatform {
    X86,
    X64,
}

impl TargetPlatform {
    fn from_config(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "x86" | "win32" => Some(Self::X86),
            "x64" | "amd64" => Some(Self::X64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
        }
    }

    /// Architecture argument understood by the toolchain environment script.
    pub fn toolchain_arg(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x86_amd64",
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of everything a run needs to know.
///
/// Built once at startup; every field is fully resolved here so that no
/// component performs environment lookups later in the run.
#[derive(Debug)]
pub struct Configuration {
    pub root: PathBuf,
    pub toolchain_dir: PathBuf,
    pub variant: BuildVariant,
    pub platform: TargetPlatform,
    pub branch: String,
    pub externals_root: String,
    pub externals: Vec<(String, String)>,
    pub keep_going_externals: bool,
    pub test_command: Vec<String>,
}

impl Configuration {
    /// Reads the layered configuration files and produces the snapshot used
    /// by the rest of the run.
    ///
    /// Layers are read in increasing priority order: the defaults shipped
    /// next to the executable, a branch-specific override, then the
    /// project-local file. A key present in a later layer wins.
    pub fn resolve(root: PathBuf, logger: &Logger) -> Result<Self, ConfigurationError> {
        let branch = match vcs::current_branch(&root) {
            Ok(branch) => branch,
            Err(e) => {
                logger.warn(format!(
                    "Cannot determine the current branch ({:#}); assuming '{}'",
                    e,
                    vcs::FALLBACK_BRANCH
                ));
                vcs::FALLBACK_BRANCH.to_string()
            }
        };

        let mut layers = Vec::new();
        if let Some(tool_dir) = tool_defaults_dir() {
            layers.push(tool_dir.join(CONFIG_FILE_NAME));
            layers.push(tool_dir.join(format!("configure.{}.ini", branch)));
        }
        layers.push(root.join(CONFIG_FILE_NAME));

        Self::from_layers(&layers, root, branch)
    }

    /// Builds a configuration from an explicit list of layer files, lowest
    /// priority first.
    ///
    /// Missing files are skipped; a key is only an error when it is absent
    /// from every layer.
    pub fn from_layers(
        layers: &[PathBuf],
        root: PathBuf,
        branch: String,
    ) -> Result<Self, ConfigurationError> {
        let merged = merge_layers(layers)?;

        let variant_value = required(&merged, "configure", "configuration")?;
        let variant = BuildVariant::from_config(variant_value)
            .ok_or_else(|| invalid("configure", "configuration", variant_value))?;

        let platform_value = required(&merged, "configure", "platform")?;
        let platform = TargetPlatform::from_config(platform_value)
            .ok_or_else(|| invalid("configure", "platform", platform_value))?;

        let envvar = required(&merged, "configure", "envvar")?.to_string();
        let toolchain_dir = env::var_os(&envvar)
            .map(PathBuf::from)
            .ok_or(ConfigurationError::MissingEnvVar { name: envvar })?;

        let externals_root = required(&merged, "locations", "externals-root")?.to_string();
        let externals = merged
            .section(Some("externals"))
            .map(|section| {
                section
                    .iter()
                    .map(|(name, version)| (name.to_string(), version.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let keep_going_externals = merged
            .get_from(Some("configure"), "keep-going-externals")
            .map(|value| matches!(value, "true" | "yes" | "1"))
            .unwrap_or(false);

        let test_value = required(&merged, "commands", "run-tests")?;
        let test_command =
            shlex::split(test_value).ok_or_else(|| invalid("commands", "run-tests", test_value))?;

        Ok(Self {
            root,
            toolchain_dir,
            variant,
            platform,
            branch,
            externals_root,
            externals,
            keep_going_externals,
            test_command,
        })
    }

    /// Directory holding intermediate build outputs.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Directory in which the toolchain places the built executables.
    pub fn output_dir(&self) -> PathBuf {
        match self.platform {
            TargetPlatform::X86 => self.build_dir(),
            TargetPlatform::X64 => self.build_dir().join("amd64"),
        }
    }

    /// Script that prepares the toolchain environment and drives a build.
    pub fn toolchain_env_script(&self) -> PathBuf {
        self.toolchain_dir.join("env.sh")
    }

    /// Name of the executable produced by the build, derived from the project
    /// directory name and the build variant.
    pub fn executable_name(&self) -> String {
        let product = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "product".to_string());
        format!(
            "{}{}{}",
            product,
            self.variant.executable_suffix(),
            env::consts::EXE_SUFFIX
        )
    }

    pub fn executable_path(&self) -> PathBuf {
        self.output_dir().join(self.executable_name())
    }

    /// Directory into which external dependencies are fetched.
    pub fn externals_dir(&self) -> PathBuf {
        self.root.join("externals")
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration {{")?;
        writeln!(f, "  root => {}", self.root.display())?;
        writeln!(f, "  branch => {}", self.branch)?;
        writeln!(f, "  configuration => {}", self.variant)?;
        writeln!(f, "  platform => {}", self.platform)?;
        writeln!(f, "  toolchain => {}", self.toolchain_dir.display())?;
        writeln!(f, "  externals-root => {}", self.externals_root)?;
        for (name, version) in &self.externals {
            writeln!(f, "  external {} => {}", name, version)?;
        }
        writeln!(f, "  run-tests => {}", self.test_command.join(" "))?;
        write!(f, "}}")
    }
}

/// Directory holding the configuration defaults shipped with the tool, i.e.
/// the directory containing the executable itself.
fn tool_defaults_dir() -> Option<PathBuf> {
    env::current_exe().ok()?.parent().map(Path::to_path_buf)
}

fn merge_layers(layers: &[PathBuf]) -> Result<Ini, ConfigurationError> {
    let mut merged = Ini::new();
    for path in layers {
        if !path.exists() {
            continue;
        }
        let layer = Ini::load_from_file(path).map_err(|source| ConfigurationError::Load {
            path: path.clone(),
            source,
        })?;
        for (section, properties) in layer.iter() {
            for (key, value) in properties.iter() {
                merged.set_to(section, key.to_string(), value.to_string());
            }
        }
    }

    Ok(merged)
}

fn required<'a>(
    merged: &'a Ini,
    section: &'static str,
    key: &'static str,
) -> Result<&'a str, ConfigurationError> {
    merged
        .get_from(Some(section), key)
        .ok_or(ConfigurationError::MissingKey { section, key })
}

fn invalid(section: &'static str, key: &'static str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        section,
        key,
        value: value.to_string(),
    }
}
