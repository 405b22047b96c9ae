//! Resource model: servers, floating IPs, groups and changesets.

mod changeset;
mod floating_ip;
mod group;
mod server;
mod status;

pub use changeset::{Changeset, GroupChangeset};
pub use floating_ip::FloatingIp;
pub use group::Group;
pub use server::Server;
pub use status::{HealthState, Status, WithStatus};

/// Common surface of cloud resources that can be diffed by identity.
///
/// Full-value equality (the `PartialEq` bound on [`Changeset::diff`]) decides
/// whether a resource counts as updated; `id` decides whether it is the same
/// resource at all.
pub trait Identified {
    /// Provider-unique identifier of the resource.
    fn id(&self) -> &str;

    /// Human-readable name of the resource.
    fn name(&self) -> &str;
}
