//! Generic multi-phase popup state machine, used by the
//! download, import, similar-artists, and Last.fm setup popups.
//!
//! A popup is a [`Phase`] trait object; [`Machine`] holds the current
//! phase plus a back-stack and drives transitions. `Back`/`Close` are
//! handled by the machine itself rather than forwarded to the phase —
//! they're implicit messages the phase never sees directly, only through
//! [`Phase::can_go_back`] gating whether `Back` does anything.

/// What a phase's `update` did in response to a message.
pub enum Transition<M, C> {
    /// Stay on the current phase, optionally running a command.
    Stay(Option<C>),
    /// Move to `next`, pushing the current phase onto the back-stack.
    Advance(Box<dyn Phase<Message = M, Command = C>>, Option<C>),
    /// Close the whole machine.
    Close(Option<C>),
}

pub trait Phase: Send {
    type Message: Send;
    type Command;

    fn name(&self) -> &'static str;
    fn update(&mut self, message: Self::Message) -> Transition<Self::Message, Self::Command>;
    fn view(&self) -> String;
    /// Whether `Back` is allowed from this phase right now.
    fn can_go_back(&self) -> bool;
}

/// A message routed to a running [`Machine`]: either forwarded into the
/// current phase, or one of the two messages the machine itself
/// understands.
pub enum MachineMessage<M> {
    Back,
    Close,
    Inner(M),
}

pub struct Machine<M, C> {
    current: Box<dyn Phase<Message = M, Command = C>>,
    history: Vec<Box<dyn Phase<Message = M, Command = C>>>,
}

impl<M, C> Machine<M, C> {
    pub fn new(root: Box<dyn Phase<Message = M, Command = C>>) -> Self {
        Self { current: root, history: Vec::new() }
    }

    pub fn current_name(&self) -> &'static str {
        self.current.name()
    }

    pub fn view(&self) -> String {
        self.current.view()
    }

    pub fn depth(&self) -> usize {
        self.history.len()
    }

    /// Handles one message. Returns `(closed, command)`: once `closed` is
    /// true the caller should drop the machine and restore focus to
    /// whatever owned it before the popup opened.
    pub fn handle(&mut self, message: MachineMessage<M>) -> (bool, Option<C>) {
        match message {
            MachineMessage::Close => (true, None),
            MachineMessage::Back => {
                if self.current.can_go_back()
                    && let Some(previous) = self.history.pop()
                {
                    self.current = previous;
                }
                (false, None)
            }
            MachineMessage::Inner(inner) => match self.current.update(inner) {
                Transition::Stay(cmd) => (false, cmd),
                Transition::Advance(next, cmd) => {
                    let previous = std::mem::replace(&mut self.current, next);
                    self.history.push(previous);
                    (false, cmd)
                }
                Transition::Close(cmd) => (true, cmd),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestMsg {
        GoToStepTwo,
        FinishStepTwo,
        Noop,
    }

    struct StepOne;
    struct StepTwo;

    impl Phase for StepOne {
        type Message = TestMsg;
        type Command = ();

        fn name(&self) -> &'static str {
            "step_one"
        }

        fn update(&mut self, message: TestMsg) -> Transition<TestMsg, ()> {
            match message {
                TestMsg::GoToStepTwo => Transition::Advance(Box::new(StepTwo), None),
                _ => Transition::Stay(None),
            }
        }

        fn view(&self) -> String {
            "one".to_string()
        }

        fn can_go_back(&self) -> bool {
            false
        }
    }

    impl Phase for StepTwo {
        type Message = TestMsg;
        type Command = ();

        fn name(&self) -> &'static str {
            "step_two"
        }

        fn update(&mut self, message: TestMsg) -> Transition<TestMsg, ()> {
            match message {
                TestMsg::FinishStepTwo => Transition::Close(None),
                _ => Transition::Stay(None),
            }
        }

        fn view(&self) -> String {
            "two".to_string()
        }

        fn can_go_back(&self) -> bool {
            true
        }
    }

    #[test]
    fn advance_pushes_history_and_back_pops_it() {
        let mut machine = Machine::new(Box::new(StepOne));
        assert_eq!(machine.current_name(), "step_one");

        let (closed, _) = machine.handle(MachineMessage::Inner(TestMsg::GoToStepTwo));
        assert!(!closed);
        assert_eq!(machine.current_name(), "step_two");
        assert_eq!(machine.depth(), 1);

        let (closed, _) = machine.handle(MachineMessage::Back);
        assert!(!closed);
        assert_eq!(machine.current_name(), "step_one");
        assert_eq!(machine.depth(), 0);
    }

    #[test]
    fn back_is_a_no_op_when_the_phase_forbids_it() {
        let mut machine: Machine<TestMsg, ()> = Machine::new(Box::new(StepTwo));
        let (closed, _) = machine.handle(MachineMessage::Inner(TestMsg::Noop));
        assert!(!closed);

        machine.history.clear();
        let (closed, _) = machine.handle(MachineMessage::Back);
        assert!(!closed);
        assert_eq!(machine.current_name(), "step_two");
    }

    #[test]
    fn close_message_closes_regardless_of_phase() {
        let mut machine = Machine::new(Box::new(StepOne));
        let (closed, _) = machine.handle(MachineMessage::Close);
        assert!(closed);
    }

    #[test]
    fn returning_close_from_update_closes_the_machine() {
        let mut machine = Machine::new(Box::new(StepTwo));
        let (closed, _) = machine.handle(MachineMessage::Inner(TestMsg::FinishStepTwo));
        assert!(closed);
    }
}
