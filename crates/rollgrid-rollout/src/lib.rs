//! rollgrid rolling updates: two-wave batch planning and orchestration
//! invocations.
//!
//! The batch planner orders instances into two interleaved waves so that
//! the two replicas of an application never update together. The assembler
//! turns a planned ordering into the exact playbook path and extra vars the
//! external automation tool is invoked with, choosing a load-balancer-aware
//! strategy when any target sits behind a mapped pool member.
//!
//! # Components
//!
//! - **`batch`**: EVEN/ODD wave planning (`plan_batches`, `split_waves`)
//! - **`strategy`**: Rollout strategy (load-balancer-aware or plain)
//! - **`directory`**: Read-only lookups of instances, servers and pool members
//! - **`assembler`**: Build the final invocation from a request

pub mod assembler;
pub mod batch;
pub mod directory;
pub mod error;
pub mod request;
pub mod strategy;

pub use assembler::{Assembler, Invocation};
pub use batch::{BatchMember, plan_batches, split_waves};
pub use directory::{RolloutTarget, TargetDirectory};
pub use error::{RolloutError, RolloutResult};
pub use request::OrchestrationRequest;
pub use strategy::RolloutStrategy;
