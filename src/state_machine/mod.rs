pub mod navigation;
pub mod system;

/// The [`StateMachine`] trait provides calling semantics and indicates the upholding of invariants
/// that guarantee deterministic behavior.
///
/// # Functionality
/// State machines operate on defined inputs and outputs. There are usually several kinds of each,
/// which in Rust is an enum per direction. The associated types [`Input`](StateMachine::Input) and
/// [`Output`](StateMachine::Output) name those groupings, and the methods
/// [`process_input`](StateMachine::process_input) and [`poll_output`](StateMachine::poll_output)
/// map them onto the inherent methods that actually hold the logic.
///
/// Keeping the dispatch here lets the machine itself stay focused on control logic instead of
/// calling conventions.
///
/// # Invariants
/// A [`StateMachine`] must be pure: its behavior may only depend on the inputs it was given, so that
/// a recorded input sequence always reproduces the same outputs.
///
/// ## No Interior Mutability
/// All state is either immutable or mutated through `&mut self`. No [`std::cell`] containers, no
/// [`std::sync`] locks, and no reference counted sharing.
///
/// ## No IO
/// No [`std::io`], [`std::net`] or anything built on them. Sensor readings arrive as input, commands
/// leave as output.
///
/// ### No System Time
/// The machine never reads a clock. Time arrives as an input value (see
/// [`SystemResource`](system::SystemResource)) and may then be compared and subtracted freely.
///
/// ## No Concurrency, No Async, No Blocking
/// The machine is driven from a single task. It never spawns, awaits or sleeps, so a control tick
/// always completes in bounded time.
///
/// # Side Effects
/// Logging and metrics are allowed as long as the machine's logic never depends on their outcome.
///
/// # Output Ordering
/// [`poll_output`](StateMachine::poll_output) hands out pending output in a fixed priority order
/// defined by the implementor. Callers drain it until it returns `None`.
///
/// # Example
/// ```ignore
/// pub struct Failsafe {
///     armed: bool,
///     pending_neutral: bool,
/// }
///
/// pub enum FailsafeInput {
///     Arm,
///     LinkLost,
/// }
///
/// pub enum FailsafeOutput {
///     Neutral,
/// }
///
/// impl StateMachine for Failsafe {
///     type Input = FailsafeInput;
///     type Output = FailsafeOutput;
///
///     fn process_input(&mut self, input: Self::Input) {
///         match input {
///             FailsafeInput::Arm => self.armed = true,
///             FailsafeInput::LinkLost => {
///                 self.armed = false;
///                 self.pending_neutral = true;
///             }
///         }
///     }
///
///     fn poll_output(&mut self) -> Option<Self::Output> {
///         std::mem::take(&mut self.pending_neutral).then_some(FailsafeOutput::Neutral)
///     }
/// }
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Process the provided `input` into the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
