pub mod machine;
pub mod states;

pub use machine::{DeploymentLifecycle, LifecycleTransitionError};
pub use states::{
    DeploymentState, DeploymentTransition, LifecycleAction, LifecycleEvent, TransitionOutcome,
};
