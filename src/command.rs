/// A request to change the state of a single aggregate instance.
///
/// Commands are inputs only: they are never stored. The concrete type of a command selects the
/// handler it is routed to.
pub trait Command: Send + Sync + 'static {
    /// Identifier of the aggregate instance this command is addressed to.
    fn target_aggregate_id(&self) -> &str;
}
