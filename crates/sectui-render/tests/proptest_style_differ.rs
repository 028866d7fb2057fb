//! Property-based tests for the style differ.
//!
//! 1. **Transitions, not depth**: for any sequence of nested scope
//!    pushes/pops, style changes, and text writes, the number of emitted
//!    style codes equals the number of per-channel resolved-value changes
//!    observed at text boundaries (plus the final return to unstyled).
//!
//! 2. **Terminal state matches intent**: replaying the emitted SGR codes
//!    on a blank style state reproduces the resolved style in force at every
//!    text run.
//!
//! 3. **Reset-and-replay agrees**: both clear strategies lead to the same
//!    on-screen style for every text run.

use proptest::prelude::*;
use sectui_core::ansi::{Color, ColorLayer};
use sectui_render::{
    Attributes, Channel, ClearStrategy, FrameBuilder, StyleChange, StyleState, TerminalCommand,
};

#[derive(Debug, Clone)]
enum Op {
    Push,
    Pop,
    Change(StyleChange),
    Text,
}

fn any_change() -> impl Strategy<Value = StyleChange> {
    let color = prop_oneof![
        Just(Color::Red),
        Just(Color::Green),
        Just(Color::BrightBlue),
        (0u8..4).prop_map(Color::Indexed),
        Just(Color::Rgb(1, 2, 3)),
    ];
    let layer = prop_oneof![Just(ColorLayer::Foreground), Just(ColorLayer::Background)];
    let attr = prop_oneof![
        Just(Attributes::BOLD),
        Just(Attributes::UNDERLINE),
        Just(Attributes::STRIKETHROUGH),
        Just(Attributes::INVERT),
    ];
    prop_oneof![
        4 => (color, layer.clone()).prop_map(|(c, l)| StyleChange::Color(l, c)),
        1 => layer.prop_map(StyleChange::ClearColor),
        3 => attr.clone().prop_map(StyleChange::Set),
        1 => attr.prop_map(StyleChange::Clear),
        1 => Just(StyleChange::Reset),
    ]
}

fn any_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            2 => Just(Op::Push),
            2 => Just(Op::Pop),
            4 => any_change().prop_map(Op::Change),
            3 => Just(Op::Text),
        ],
        0..64,
    )
}

/// Independent model of nested scopes: resolved state at each text write.
fn model_text_states(ops: &[Op]) -> Vec<StyleState> {
    let mut stack = vec![StyleState::default()];
    let mut states = Vec::new();
    for op in ops {
        match op {
            Op::Push => {
                let top = *stack.last().unwrap();
                stack.push(top);
            }
            Op::Pop => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            Op::Change(change) => stack.last_mut().unwrap().apply(*change),
            Op::Text => states.push(*stack.last().unwrap()),
        }
    }
    states
}

fn transitions(states: &[StyleState]) -> usize {
    let mut previous = StyleState::default();
    let mut count = 0;
    for state in states.iter().chain(std::iter::once(&StyleState::default())) {
        count += Channel::ALL
            .iter()
            .filter(|&&ch| state.differs(&previous, ch))
            .count();
        previous = *state;
    }
    count
}

fn render(ops: &[Op], strategy: ClearStrategy) -> Vec<TerminalCommand> {
    let mut frame = FrameBuilder::new(strategy);
    for op in ops {
        match op {
            Op::Push => frame.push_scope(),
            Op::Pop => frame.pop_scope(),
            Op::Change(change) => frame.style(*change),
            Op::Text => frame.text("x"),
        }
    }
    frame.finish()
}

/// Replay emitted codes and capture the on-screen style at each text run.
fn screen_states(commands: &[TerminalCommand]) -> Vec<StyleState> {
    let mut screen = StyleState::default();
    let mut states = Vec::new();
    for command in commands {
        match command {
            TerminalCommand::Sgr(code) => {
                screen.apply(StyleChange::from_sgr(code).expect("differ emits known codes"));
            }
            TerminalCommand::Text(_) => states.push(screen),
            TerminalCommand::Newline | TerminalCommand::Link(_) => {}
        }
    }
    states
}

proptest! {
    #[test]
    fn emitted_codes_equal_resolved_transitions(ops in any_ops()) {
        let commands = render(&ops, ClearStrategy::Scalpel);
        let emitted = commands
            .iter()
            .filter(|c| matches!(c, TerminalCommand::Sgr(_)))
            .count();
        prop_assert_eq!(emitted, transitions(&model_text_states(&ops)));
    }

    #[test]
    fn screen_matches_intent(ops in any_ops()) {
        let expected = model_text_states(&ops);
        let commands = render(&ops, ClearStrategy::Scalpel);
        prop_assert_eq!(screen_states(&commands), expected);
    }

    #[test]
    fn reset_and_replay_agrees(ops in any_ops()) {
        let expected = model_text_states(&ops);
        let commands = render(&ops, ClearStrategy::ResetAndReplay);
        prop_assert_eq!(screen_states(&commands), expected);
    }

    #[test]
    fn frame_ends_unstyled(ops in any_ops()) {
        let commands = render(&ops, ClearStrategy::Scalpel);
        let mut screen = StyleState::default();
        for command in &commands {
            if let TerminalCommand::Sgr(code) = command {
                screen.apply(StyleChange::from_sgr(code).unwrap());
            }
        }
        prop_assert_eq!(screen, StyleState::default());
    }
}
