//! Rendering context provisioning
//!
//! Acquires the WebGL2 context the guest renders into, with a fixed
//! attribute profile, before the guest module is created. The guest is handed
//! this context instead of creating its own.
//!
//! # Capability Activation
//!
//! WebGL reports extensions through `getSupportedExtensions()` but only
//! enables one once `getExtension()` has been called for it. A guest that
//! queries the GL extension string afterwards sees the supported set, not the
//! enabled one, and fails the first time it touches an extension nobody
//! activated. [`activate_capabilities`] therefore activates every supported
//! extension up front. This is a host workaround, kept as its own step.
//!
//! # Surface Loss
//!
//! The host may drop the context at any time (driver reset, GPU process crash).
//! The guest cannot rebuild its GPU state, so loss is terminal for the session:
//! the default action of the loss event is always prevented and the user is
//! asked to reload.

use std::collections::HashSet;

use emboot_hal::{BootHal, ContextAttributes, HalError, HostEvent, PowerPreference};
use thiserror::Error;

/// Context provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// No context with the required profile can be created (fatal)
    #[error("rendering context unavailable: {0}")]
    Unavailable(#[source] HalError),
}

/// Liveness of the provisioned surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    Live,
    Lost,
}

/// The attribute profile every context is requested with.
///
/// No page-alpha blending, no multisampling, no depth or stencil buffer (the
/// guest renders into its own framebuffers), high-performance GPU,
/// premultiplied compositing and a back buffer that is not preserved between frames.
pub fn required_attributes() -> ContextAttributes {
    ContextAttributes {
        alpha: false,
        antialias: false,
        depth: false,
        power_preference: PowerPreference::HighPerformance,
        premultiplied_alpha: true,
        preserve_drawing_buffer: false,
        stencil: false,
    }
}

/// Result of capability activation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Activation {
    /// Extensions the host enabled, in the order reported
    pub activated: Vec<String>,
    /// Reported extensions the host refused to enable
    pub refused: Vec<String>,
}

/// Enable every extension the context reports as supported.
///
/// Each distinct name is activated exactly once; nothing outside the
/// reported set is touched.
pub fn activate_capabilities<H: BootHal>(hal: &H, ctx: &H::Context) -> Activation {
    let mut seen = HashSet::new();
    let mut result = Activation::default();

    for name in hal.supported_extensions(ctx) {
        if !seen.insert(name.clone()) {
            continue;
        }
        if hal.enable_extension(ctx, &name) {
            result.activated.push(name);
        } else {
            log::warn!("[provision] Host refused to enable reported extension {}", name);
            result.refused.push(name);
        }
    }

    log::info!(
        "[provision] Activated {} extensions ({} refused)",
        result.activated.len(),
        result.refused.len()
    );
    result
}

/// A context acquired with [`required_attributes`] and fully activated
pub struct ProvisionedContext<C> {
    context: C,
    activation: Activation,
    surface: SurfaceState,
}

impl<C> ProvisionedContext<C> {
    /// Acquire the context and activate its capabilities
    pub fn provision<H: BootHal<Context = C>>(hal: &H) -> Result<Self, ProvisionError> {
        let attrs = required_attributes();
        let context = hal.acquire_context(&attrs).map_err(|e| {
            log::error!("[provision] Context acquisition failed: {}", e);
            ProvisionError::Unavailable(e)
        })?;

        let activation = activate_capabilities(hal, &context);

        Ok(Self {
            context,
            activation,
            surface: SurfaceState::Live,
        })
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn activation(&self) -> &Activation {
        &self.activation
    }

    pub fn surface(&self) -> SurfaceState {
        self.surface
    }

    /// Handle a context-loss notification.
    ///
    /// Always suppresses the event's default action. Returns `true` the first
    /// time the surface is lost, `false` for repeated notifications.
    pub fn handle_context_lost(&mut self, event: &impl HostEvent) -> bool {
        event.prevent_default();

        if self.surface == SurfaceState::Lost {
            return false;
        }
        self.surface = SurfaceState::Lost;
        log::error!("[provision] Rendering context lost; session cannot continue");
        true
    }
}
