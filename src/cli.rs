use clap::{crate_version, App, AppSettings, Arg};

pub mod arg {
    pub static PROJECT_DIR: &str = "project_dir";
    pub static VERBOSITY: &str = "verbosity";
    pub static TARGETS: &str = "targets";
}

pub fn get_app() -> App<'static, 'static> {
    App::new("mason")
        .version(crate_version!())
        .about("Drive the build of a native project through named targets")
        .arg(
            Arg::with_name(arg::PROJECT_DIR)
                .short("p")
                .long("project")
                .takes_value(true)
                .value_name("PROJECT_DIR")
                .default_value(".")
                .hide_default_value(true)
                .help("Directory of the project to build (in which 'configure.ini' is located)"),
        )
        .arg(
            Arg::with_name(arg::VERBOSITY)
                .short("v")
                .multiple(true)
                .takes_value(false)
                .help("Increases message verbosity on the screen"),
        )
        .arg(
            Arg::with_name(arg::TARGETS)
                .value_name("TARGETS")
                .multiple(true)
                .allow_hyphen_values(true)
                .help("Targets to run, in order (defaults to 'all')"),
        )
        .setting(AppSettings::ColoredHelp)
        .setting(AppSettings::TrailingVarArg)
}

#[cfg(test)]
mod tests {
    use super::{arg, get_app};

    #[test]
    fn test_get_app_verbosity_is_optional() {
        let arg_matches = get_app().get_matches_from(vec!["mason", "clean"]);
        assert_eq!(arg_matches.occurrences_of(arg::VERBOSITY), 0);
    }

    #[test]
    fn test_get_app_verbosity_accepts_multiple_occurrences() {
        let arg_matches = get_app().get_matches_from(vec!["mason", "-vv", "clean"]);
        assert_eq!(arg_matches.occurrences_of(arg::VERBOSITY), 2);
    }

    #[test]
    fn test_get_app_targets_are_optional_and_ordered() {
        let arg_matches = get_app().get_matches_from(vec!["mason"]);
        assert_eq!(arg_matches.values_of_lossy(arg::TARGETS), None);

        let arg_matches = get_app().get_matches_from(vec!["mason", "clean", "build", "test"]);
        assert_eq!(
            arg_matches.values_of_lossy(arg::TARGETS),
            Some(vec![
                "clean".to_string(),
                "build".to_string(),
                "test".to_string()
            ])
        );
    }

    #[test]
    fn test_get_app_targets_accept_hyphen_values() {
        // Everything after the test target is handed to the test runner,
        // including flag-like tokens such as `-j3`.
        let arg_matches = get_app().get_matches_from(vec!["mason", "test", "-j3"]);
        assert_eq!(
            arg_matches.values_of_lossy(arg::TARGETS),
            Some(vec!["test".to_string(), "-j3".to_string()])
        );
    }

    #[test]
    fn test_get_app_project_dir_defaults_to_current_directory() {
        let arg_matches = get_app().get_matches_from(vec!["mason"]);
        assert_eq!(arg_matches.value_of(arg::PROJECT_DIR), Some("."));
    }
}
