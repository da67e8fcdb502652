//! Concrete popup phases built on [`crate::popup`]. Last.fm setup is the
//! one genuinely multi-phase popup wired up end to end; everything else
//! (errors, confirmations) is a single screen and doesn't need the
//! machine.

use crate::popup::{Machine, Phase, Transition};

#[derive(Debug, Clone)]
pub enum SetupMsg {
    Char(char),
    Backspace,
    Submit,
}

#[derive(Debug, Clone)]
pub enum SetupCmd {
    Save { api_key: String, api_secret: String },
}

pub type LastfmSetupMachine = Machine<SetupMsg, SetupCmd>;

struct EnterApiKey {
    value: String,
}

impl Phase for EnterApiKey {
    type Message = SetupMsg;
    type Command = SetupCmd;

    fn name(&self) -> &'static str {
        "lastfm_setup_api_key"
    }

    fn update(&mut self, message: SetupMsg) -> Transition<SetupMsg, SetupCmd> {
        match message {
            SetupMsg::Char(c) => {
                self.value.push(c);
                Transition::Stay(None)
            }
            SetupMsg::Backspace => {
                self.value.pop();
                Transition::Stay(None)
            }
            SetupMsg::Submit if !self.value.is_empty() => {
                Transition::Advance(Box::new(EnterApiSecret { api_key: self.value.clone(), value: String::new() }), None)
            }
            SetupMsg::Submit => Transition::Stay(None),
        }
    }

    fn view(&self) -> String {
        format!("Last.fm API key: {}\n(Enter to continue, Esc to cancel)", self.value)
    }

    fn can_go_back(&self) -> bool {
        false
    }
}

struct EnterApiSecret {
    api_key: String,
    value: String,
}

impl Phase for EnterApiSecret {
    type Message = SetupMsg;
    type Command = SetupCmd;

    fn name(&self) -> &'static str {
        "lastfm_setup_api_secret"
    }

    fn update(&mut self, message: SetupMsg) -> Transition<SetupMsg, SetupCmd> {
        match message {
            SetupMsg::Char(c) => {
                self.value.push(c);
                Transition::Stay(None)
            }
            SetupMsg::Backspace => {
                self.value.pop();
                Transition::Stay(None)
            }
            SetupMsg::Submit if !self.value.is_empty() => Transition::Advance(
                Box::new(ConfirmSetup { api_key: self.api_key.clone(), api_secret: self.value.clone() }),
                None,
            ),
            SetupMsg::Submit => Transition::Stay(None),
        }
    }

    fn view(&self) -> String {
        format!("Last.fm API secret: {}\n(Enter to continue, Esc to go back)", "*".repeat(self.value.len()))
    }

    fn can_go_back(&self) -> bool {
        true
    }
}

struct ConfirmSetup {
    api_key: String,
    api_secret: String,
}

impl Phase for ConfirmSetup {
    type Message = SetupMsg;
    type Command = SetupCmd;

    fn name(&self) -> &'static str {
        "lastfm_setup_confirm"
    }

    fn update(&mut self, message: SetupMsg) -> Transition<SetupMsg, SetupCmd> {
        match message {
            SetupMsg::Submit => Transition::Close(Some(SetupCmd::Save {
                api_key: self.api_key.clone(),
                api_secret: self.api_secret.clone(),
            })),
            _ => Transition::Stay(None),
        }
    }

    fn view(&self) -> String {
        format!("Save Last.fm credentials for {}? (Enter to confirm, Esc to go back)", self.api_key)
    }

    fn can_go_back(&self) -> bool {
        true
    }
}

pub fn new_lastfm_setup() -> LastfmSetupMachine {
    Machine::new(Box::new(EnterApiKey { value: String::new() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::MachineMessage;

    #[test]
    fn full_setup_flow_produces_a_save_command() {
        let mut machine = new_lastfm_setup();
        for c in "key123".chars() {
            machine.handle(MachineMessage::Inner(SetupMsg::Char(c)));
        }
        machine.handle(MachineMessage::Inner(SetupMsg::Submit));
        assert_eq!(machine.current_name(), "lastfm_setup_api_secret");

        for c in "secret456".chars() {
            machine.handle(MachineMessage::Inner(SetupMsg::Char(c)));
        }
        machine.handle(MachineMessage::Inner(SetupMsg::Submit));
        assert_eq!(machine.current_name(), "lastfm_setup_confirm");

        let (closed, cmd) = machine.handle(MachineMessage::Inner(SetupMsg::Submit));
        assert!(closed);
        match cmd {
            Some(SetupCmd::Save { api_key, api_secret }) => {
                assert_eq!(api_key, "key123");
                assert_eq!(api_secret, "secret456");
            }
            None => panic!("expected a save command"),
        }
    }

    #[test]
    fn empty_api_key_cannot_be_submitted() {
        let mut machine = new_lastfm_setup();
        machine.handle(MachineMessage::Inner(SetupMsg::Submit));
        assert_eq!(machine.current_name(), "lastfm_setup_api_key");
    }
}
