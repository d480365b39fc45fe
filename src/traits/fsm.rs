/// A state machine whose transitions are pure functions of the current state
/// and one input, with side information accumulated in `Context`.
pub trait FiniteStateMachine {
    type Input;
    type Context;

    #[must_use]
    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self;
}
