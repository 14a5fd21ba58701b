//! Lumacast Engine — runtime integration of the compositing pipeline.
//!
//! Owns the render thread, the landmark → mask pump, off-tick LUT loading,
//! the health watchdog and the frame distributor. Hosts drive everything
//! through [`Engine`].

pub mod compositor;
pub mod distributor;
pub mod engine;
pub mod faults;
pub mod landmarks;
pub mod loader;
pub mod render_loop;
pub mod watchdog;

pub use compositor::{Compositor, CompositorLinks, CompositorState, TickOutcome};
pub use distributor::{
    CaptureStream, DistributorError, FrameDistributor, RelayClosed, RelayFrame, RelayReceiver,
    TransportCapabilities, TransportKind,
};
pub use engine::{Engine, EngineError, select_backend};
pub use faults::{EngineFault, FaultBus};
pub use landmarks::{LandmarkFeed, LandmarkUpdate, MaskPump, MaskSlot};
pub use loader::AsyncLutLoader;
pub use render_loop::{LoopControl, OutputRoute, RenderLoop, SharedRoute};
pub use watchdog::{Watchdog, WatchdogInputs};
