//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Mailview.
//
// Mailview is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Mailview is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mailview. If not, see <http://www.gnu.org/licenses/>.

/// Four-valued option: a fixed answer, or a prompt with a default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quad {
    No,
    Yes,
    AskNo,
    AskYes,
}

impl Quad {
    pub fn parse(s: &str) -> Option<Self> {
        [Quad::No, Quad::Yes, Quad::AskNo, Quad::AskYes]
            .iter()
            .copied()
            .find(|q| q.name().eq_ignore_ascii_case(s))
    }

    pub fn name(self) -> &'static str {
        match self {
            Quad::No => "no",
            Quad::Yes => "yes",
            Quad::AskNo => "ask-no",
            Quad::AskYes => "ask-yes",
        }
    }

    /// Flip the answer, keeping whether the user is asked.
    pub fn toggle(self) -> Self {
        match self {
            Quad::No => Quad::Yes,
            Quad::Yes => Quad::No,
            Quad::AskNo => Quad::AskYes,
            Quad::AskYes => Quad::AskNo,
        }
    }

    /// The answer to use when there is nobody to ask.
    pub fn default_answer(self) -> bool {
        match self {
            Quad::Yes | Quad::AskYes => true,
            Quad::No | Quad::AskNo => false,
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn quad() -> impl Strategy<Value = Quad> {
        prop_oneof![
            Just(Quad::No),
            Just(Quad::Yes),
            Just(Quad::AskNo),
            Just(Quad::AskYes),
        ]
    }

    #[test]
    fn spellings() {
        assert_eq!(Some(Quad::AskYes), Quad::parse("ASK-yes"));
        assert_eq!(None, Quad::parse("ask"));
        assert!(Quad::AskYes.default_answer());
        assert!(!Quad::AskNo.default_answer());
    }

    proptest! {
        #[test]
        fn toggle_stays_within_family(q in quad()) {
            let asks = |q: Quad| matches!(q, Quad::AskNo | Quad::AskYes);
            prop_assert_eq!(asks(q), asks(q.toggle()));
            prop_assert_ne!(q, q.toggle());
            prop_assert_eq!(q, q.toggle().toggle().toggle().toggle());
            prop_assert_eq!(Some(q), Quad::parse(q.name()));
        }
    }
}
