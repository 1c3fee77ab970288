//! Evaluation Steps
//!
//! The leaves of every vertex's eval tree. Resource steps take the
//! per-address lock around their read-modify-write of state and diff.

use serde_json::Value;

use crate::config::{is_unknown, RawConfig};
use crate::error::{EvalError, ProviderError};
use crate::graph::ModulePath;

use super::state::{Address, ResourceDiff};
use super::{EvalContext, EvalStep};

fn provider_failure(provider: &Address, target: &Address) -> impl FnOnce(ProviderError) -> EvalError {
    let provider = provider.to_string();
    let address = target.to_string();
    move |source| EvalError::Provider {
        provider,
        address,
        source,
    }
}

// Outputs

/// Interpolate an output value and record it.
#[derive(Debug, Clone)]
pub struct WriteOutput {
    pub address: Address,
    pub value: RawConfig,
}

impl EvalStep for WriteOutput {
    fn name(&self) -> &'static str {
        "write_output"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let value = ctx.interpolate(&self.address.path, &self.value)?;
        if is_unknown(&value) {
            // Not computable yet; readers see it as unknown.
            ctx.remove_output(&self.address);
        } else {
            ctx.set_output(&self.address, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoveOutput {
    pub address: Address,
}

impl EvalStep for RemoveOutput {
    fn name(&self) -> &'static str {
        "remove_output"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        ctx.remove_output(&self.address);
        Ok(())
    }
}

// Variables

/// Fail when a variable has no value from inputs, arguments, or defaults.
#[derive(Debug, Clone)]
pub struct CheckVariable {
    pub path: ModulePath,
    pub name: String,
}

impl EvalStep for CheckVariable {
    fn name(&self) -> &'static str {
        "check_variable"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        ctx.variable(&self.path, &self.name).map(drop)
    }
}

// Providers

#[derive(Debug, Clone)]
pub struct InitProvider {
    pub address: Address,
    /// Provider name used to pick the factory.
    pub name: String,
}

impl EvalStep for InitProvider {
    fn name(&self) -> &'static str {
        "init_provider"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        ctx.init_provider(&self.address, &self.name).map(drop)
    }
}

#[derive(Debug, Clone)]
pub struct ValidateProvider {
    pub address: Address,
    pub config: RawConfig,
}

impl EvalStep for ValidateProvider {
    fn name(&self) -> &'static str {
        "validate_provider"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        self.config.validate()?;
        ctx.provider(&self.address)?
            .validate(self.config.value())
            .map_err(provider_failure(&self.address, &self.address))
    }
}

#[derive(Debug, Clone)]
pub struct ConfigureProvider {
    pub address: Address,
    pub config: RawConfig,
}

impl EvalStep for ConfigureProvider {
    fn name(&self) -> &'static str {
        "configure_provider"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let config = ctx.interpolate(&self.address.path, &self.config)?;
        ctx.provider(&self.address)?
            .configure(&config)
            .map_err(provider_failure(&self.address, &self.address))?;
        ctx.set_provider_config(&self.address, config);
        Ok(())
    }
}

// Resources

#[derive(Debug, Clone)]
pub struct ValidateResource {
    pub address: Address,
    pub kind: String,
    pub provider: Address,
    pub config: RawConfig,
}

impl EvalStep for ValidateResource {
    fn name(&self) -> &'static str {
        "validate_resource"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        self.config.validate()?;
        ctx.provider(&self.provider)?
            .validate_resource(&self.kind, self.config.value())
            .map_err(provider_failure(&self.provider, &self.address))
    }
}

/// Re-read recorded state; a resource the provider no longer finds is
/// dropped from state.
#[derive(Debug, Clone)]
pub struct RefreshResource {
    pub address: Address,
    pub kind: String,
    pub provider: Address,
}

impl EvalStep for RefreshResource {
    fn name(&self) -> &'static str {
        "refresh_resource"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let lock = ctx.lock(&self.address);
        let _guard = lock.lock();

        let Some(state) = ctx.resource_state(&self.address) else {
            return Ok(());
        };
        let refreshed = ctx
            .provider(&self.provider)?
            .refresh(&self.kind, &state)
            .map_err(provider_failure(&self.provider, &self.address))?;
        if refreshed.is_none() {
            tracing::debug!(resource = %self.address, "resource no longer exists");
        }
        ctx.set_resource_state(&self.address, refreshed);
        Ok(())
    }
}

/// Diff interpolated configuration against state and record the result.
#[derive(Debug, Clone)]
pub struct DiffResource {
    pub address: Address,
    pub kind: String,
    pub provider: Address,
    pub config: RawConfig,
}

impl EvalStep for DiffResource {
    fn name(&self) -> &'static str {
        "diff_resource"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let config: Value = ctx.interpolate(&self.address.path, &self.config)?;
        let provider = ctx.provider(&self.provider)?;

        let lock = ctx.lock(&self.address);
        let _guard = lock.lock();

        let state = ctx.resource_state(&self.address);
        let diff = provider
            .diff(&self.kind, state.as_ref(), &config)
            .map_err(provider_failure(&self.provider, &self.address))?;
        ctx.set_diff(&self.address, (!diff.is_empty()).then_some(diff));
        Ok(())
    }
}

/// Record a destroy diff for a resource that exists in state.
#[derive(Debug, Clone)]
pub struct DiffDestroy {
    pub address: Address,
}

impl EvalStep for DiffDestroy {
    fn name(&self) -> &'static str {
        "diff_destroy"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let lock = ctx.lock(&self.address);
        let _guard = lock.lock();

        let diff = ctx
            .resource_state(&self.address)
            .map(|_| ResourceDiff::destroy());
        ctx.set_diff(&self.address, diff);
        Ok(())
    }
}

/// Apply the recorded diff and store the new state.
#[derive(Debug, Clone)]
pub struct ApplyResource {
    pub address: Address,
    pub kind: String,
    pub provider: Address,
    /// Written into the new state.
    pub dependencies: Vec<String>,
}

impl EvalStep for ApplyResource {
    fn name(&self) -> &'static str {
        "apply_resource"
    }

    fn eval(&self, ctx: &EvalContext) -> Result<(), EvalError> {
        let lock = ctx.lock(&self.address);
        let _guard = lock.lock();

        let Some(diff) = ctx.diff(&self.address) else {
            return Ok(());
        };
        let state = ctx.resource_state(&self.address);
        let mut applied = ctx
            .provider(&self.provider)?
            .apply(&self.kind, state.as_ref(), &diff)
            .map_err(provider_failure(&self.provider, &self.address))?;
        if let Some(state) = applied.as_mut() {
            state.dependencies = self.dependencies.clone();
        }

        tracing::debug!(
            resource = %self.address,
            destroyed = applied.is_none(),
            "applied diff"
        );
        ctx.set_resource_state(&self.address, applied);
        ctx.set_diff(&self.address, None);
        Ok(())
    }
}
