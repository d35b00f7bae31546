use crate::config::Configuration;
use crate::logger::Logger;
use crate::runner::CommandRunner;
use anyhow::{Context, Result};
use std::collections::VecDeque;

/// Target executed when the caller requests nothing in particular.
pub const DEFAULT_TARGET: &str = "all";

pub type TargetBody = Box<dyn Fn(&mut TargetContext<'_>) -> Result<()>>;

/// A named, invokable build operation.
pub struct Target {
    name: String,
    summary: String,
    body: TargetBody,
}

impl Target {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// The set of operations a build exposes, looked up by name.
#[derive(Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, summary: &str, body: TargetBody) {
        self.targets.push(Target {
            name: name.to_string(),
            summary: summary.to_string(),
            body,
        });
    }

    /// Every name `resolve` accepts, in registration order.
    pub fn list_targets(&self) -> Vec<&str> {
        self.targets.iter().map(|target| target.name.as_str()).collect()
    }

    pub fn resolve(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|target| target.name == name)
    }
}

/// Pending target names, consumed from the front.
///
/// A running target may expand the queue at either end, or drain it to turn
/// the remaining names into arguments, but cannot otherwise rearrange it.
pub struct TargetQueue {
    names: VecDeque<String>,
}

impl TargetQueue {
    fn new(requested: Vec<String>) -> Self {
        Self {
            names: requested.into(),
        }
    }

    fn pop_front(&mut self) -> Option<String> {
        self.names.pop_front()
    }

    pub fn push_front(&mut self, name: &str) {
        self.names.push_front(name.to_string());
    }

    pub fn push_back(&mut self, name: &str) {
        self.names.push_back(name.to_string());
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.names.drain(..).collect()
    }
}

/// Everything a target body has access to while it runs.
pub struct TargetContext<'a> {
    pub config: &'a Configuration,
    pub runner: &'a CommandRunner<'a>,
    pub logger: &'a Logger,
    pub queue: &'a mut TargetQueue,
}

/// Runs targets one at a time until the queue is empty or a target fails.
pub struct Executor<'a> {
    registry: &'a TargetRegistry,
    config: &'a Configuration,
    runner: &'a CommandRunner<'a>,
    logger: &'a Logger,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a TargetRegistry,
        config: &'a Configuration,
        runner: &'a CommandRunner<'a>,
        logger: &'a Logger,
    ) -> Self {
        Self {
            registry,
            config,
            runner,
            logger,
        }
    }

    /// Consumes target names from the front of the queue until it is empty.
    ///
    /// Unknown names are skipped with a warning. The first failure aborts the
    /// remaining queue.
    pub fn run(&self, requested: Vec<String>) -> Result<()> {
        let requested = if requested.is_empty() {
            vec![DEFAULT_TARGET.to_string()]
        } else {
            requested
        };
        let mut queue = TargetQueue::new(requested);

        while let Some(name) = queue.pop_front() {
            let target = match self.registry.resolve(&name) {
                Some(target) => target,
                None => {
                    self.logger
                        .warn(format!("Unknown target: {}; ignoring", name));
                    for known in self.registry.list_targets() {
                        if let Some(target) = self.registry.resolve(known) {
                            self.logger
                                .debug(format!("  {} - {}", known, target.summary()));
                        }
                    }
                    continue;
                }
            };

            self.logger.info(format!("Executing {}", name));
            let mut context = TargetContext {
                config: self.config,
                runner: self.runner,
                logger: self.logger,
                queue: &mut queue,
            };
            (target.body)(&mut context).with_context(|| format!("Target {} failed", name))?;
        }

        self.logger.info("Completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, TargetRegistry};
    use crate::config::{BuildVariant, Configuration, TargetPlatform};
    use crate::logger::Logger;
    use crate::runner::CommandRunner;
    use anyhow::anyhow;
    use log::LevelFilter;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    fn test_config(root: &Path) -> Configuration {
        Configuration {
            root: root.to_path_buf(),
            toolchain_dir: root.join("toolchain"),
            variant: BuildVariant::Debug,
            platform: TargetPlatform::X86,
            branch: "default".to_string(),
            externals_root: "https://example.org/externals".to_string(),
            externals: Vec::new(),
            keep_going_externals: false,
            test_command: vec!["-m".to_string(), "test".to_string()],
        }
    }

    fn recording(
        registry: &mut TargetRegistry,
        name: &'static str,
        invocations: &Rc<RefCell<Vec<&'static str>>>,
    ) {
        let invocations = Rc::clone(invocations);
        registry.register(
            name,
            "records its own invocation",
            Box::new(move |_: &mut super::TargetContext| {
                invocations.borrow_mut().push(name);
                Ok(())
            }),
        );
    }

    fn names(requested: &[&str]) -> Vec<String> {
        requested.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_list_targets_matches_resolve() {
        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "build", &invocations);
        recording(&mut registry, "clean", &invocations);

        for name in registry.list_targets() {
            assert!(registry.resolve(name).is_some());
        }
        assert_eq!(registry.list_targets().len(), 2);
        assert!(registry.resolve("bogus").is_none());
    }

    #[test]
    fn test_unknown_target_is_skipped_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "clean", &invocations);

        let executor = Executor::new(&registry, &config, &runner, &logger);
        executor.run(names(&["bogus", "clean"])).unwrap();

        assert_eq!(*invocations.borrow(), vec!["clean"]);
    }

    #[test]
    fn test_first_failure_aborts_the_remaining_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "clean", &invocations);
        registry.register(
            "build",
            "always fails",
            Box::new(|_: &mut super::TargetContext| Err(anyhow!("toolchain exploded"))),
        );
        recording(&mut registry, "test", &invocations);

        let executor = Executor::new(&registry, &config, &runner, &logger);
        let error = executor.run(names(&["clean", "build", "test"])).unwrap_err();

        assert!(error.to_string().contains("Target build failed"));
        assert_eq!(*invocations.borrow(), vec!["clean"]);
    }

    #[test]
    fn test_composite_target_expands_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "first", &invocations);
        recording(&mut registry, "second", &invocations);
        recording(&mut registry, "later", &invocations);
        registry.register(
            "pipeline",
            "enqueues its sub-targets",
            Box::new(|context: &mut super::TargetContext| {
                for name in ["second", "first"] {
                    context.queue.push_front(name);
                }
                Ok(())
            }),
        );

        let executor = Executor::new(&registry, &config, &runner, &logger);
        executor.run(names(&["pipeline", "later"])).unwrap();

        // The expansion runs before the names that were already queued.
        assert_eq!(*invocations.borrow(), vec!["first", "second", "later"]);
    }

    #[test]
    fn test_target_may_defer_work_to_the_back_of_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "middle", &invocations);
        recording(&mut registry, "last", &invocations);
        registry.register(
            "deferring",
            "queues a follow-up after everything else",
            Box::new(|context: &mut super::TargetContext| {
                context.queue.push_back("last");
                Ok(())
            }),
        );

        let executor = Executor::new(&registry, &config, &runner, &logger);
        executor.run(names(&["deferring", "middle"])).unwrap();

        assert_eq!(*invocations.borrow(), vec!["middle", "last"]);
    }

    #[test]
    fn test_target_may_consume_the_remaining_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let consumed = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "never_run", &invocations);
        let consumed_by_body = Rc::clone(&consumed);
        registry.register(
            "consume",
            "turns the rest of the queue into arguments",
            Box::new(move |context: &mut super::TargetContext| {
                consumed_by_body.borrow_mut().extend(context.queue.drain());
                Ok(())
            }),
        );

        let executor = Executor::new(&registry, &config, &runner, &logger);
        executor
            .run(names(&["consume", "never_run", "extra-arg"]))
            .unwrap();

        assert!(invocations.borrow().is_empty());
        assert_eq!(*consumed.borrow(), vec!["never_run", "extra-arg"]);
    }

    #[test]
    fn test_empty_request_defaults_to_all() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let logger =
            Logger::create(&dir.path().join("test.log"), LevelFilter::Off, LevelFilter::Debug)
                .unwrap();
        let runner = CommandRunner::new(&logger);

        let invocations = Rc::new(RefCell::new(Vec::new()));
        let mut registry = TargetRegistry::new();
        recording(&mut registry, "all", &invocations);

        let executor = Executor::new(&registry, &config, &runner, &logger);
        executor.run(Vec::new()).unwrap();

        assert_eq!(*invocations.borrow(), vec!["all"]);
    }
}
