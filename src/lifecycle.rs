//! Lifecycle hooks driven by the hosting process.
//!
//! A [`Component`] is loaded in two phases (`config_will_load`, then
//! `config_did_load`), started with `serve` and stopped with `shutdown`.
//! Components may own sub-components (`exts`) that run through the same
//! hooks. [`App`] is a minimal host that drives a set of components.

use crate::config::ConfigTree;
use crate::error::Result;

/// A unit of the hosting process with its own lifecycle.
pub trait Component: Send + Sync {
    /// Name of the component; also the key of its config section.
    fn name(&self) -> &str;

    /// Sub-components that need their own lifecycle hooks.
    fn exts(&mut self) -> Vec<&mut dyn Component> {
        Vec::new()
    }

    /// Called before the configuration is loaded.
    fn config_will_load(&mut self, _config: &ConfigTree) {}

    /// Called once the configuration is available.
    ///
    /// Configuration problems are fatal here and panic.
    fn config_did_load(&mut self, config: &ConfigTree);

    /// Starts the component; an error means it is not ready.
    fn serve(&self) -> Result<()>;

    /// Stops the component and releases its resources.
    fn shutdown(&mut self) -> Result<()>;
}

/// Drives components through their lifecycle.
///
/// Sub-components go first for loading and serving, and last for shutdown.
#[derive(Default)]
pub struct App {
    components: Vec<Box<dyn Component>>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, component: impl Component + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    pub fn components(&self) -> impl Iterator<Item = &(dyn Component + 'static)> {
        self.components.iter().map(Box::as_ref)
    }

    /// Runs both configuration hooks on every component.
    pub fn load(&mut self, config: &ConfigTree) {
        for component in &mut self.components {
            walk(component.as_mut(), &mut |c| c.config_will_load(config));
        }
        for component in &mut self.components {
            walk(component.as_mut(), &mut |c| {
                tracing::debug!(component = c.name(), "loading config");
                c.config_did_load(config);
            });
        }
    }

    /// Starts every component, stopping at the first failure.
    pub fn serve(&mut self) -> Result<()> {
        for component in &mut self.components {
            try_walk(component.as_mut(), &mut |c| {
                c.serve().inspect_err(|err| {
                    tracing::warn!(component = c.name(), error = %err, "component failed to start");
                })
            })?;
        }
        Ok(())
    }

    /// Stops every component in reverse order.
    ///
    /// Every component is stopped even if an earlier one fails; the first
    /// error is returned.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut first_err = None;
        for component in self.components.iter_mut().rev() {
            walk_rev(component.as_mut(), &mut |c| {
                if let Err(err) = c.shutdown() {
                    tracing::warn!(component = c.name(), error = %err, "component failed to stop");
                    first_err.get_or_insert(err);
                }
            });
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn walk(component: &mut dyn Component, f: &mut dyn FnMut(&mut dyn Component)) {
    for ext in component.exts() {
        walk(ext, f);
    }
    f(component);
}

fn walk_rev(component: &mut dyn Component, f: &mut dyn FnMut(&mut dyn Component)) {
    f(component);
    for ext in component.exts().into_iter().rev() {
        walk_rev(ext, f);
    }
}

fn try_walk(
    component: &mut dyn Component,
    f: &mut dyn FnMut(&mut dyn Component) -> Result<()>,
) -> Result<()> {
    for ext in component.exts() {
        try_walk(ext, f)?;
    }
    f(component)
}
