//! Which sections and subjects exist for each class.
//!
//! Classes are numbered 1 to 10 and fall into three bands. Every band offers sections A-C, the
//! senior band also has the NEEV section. When several classes are selected at once (eg. when
//! setting up a teacher), the offered subjects are the union of every band that overlaps the
//! span from the lowest to the highest selected class.

use std::{fmt, ops::RangeInclusive};

pub static SECTIONS: [&str; 4] = ["A", "B", "C", "NEEV"];
pub const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "O+", "O-", "AB+", "AB-"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassNumber(u8);

impl ClassNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub const fn new(n: u8) -> Option<Self> {
        if n >= Self::MIN && n <= Self::MAX {
            Some(Self(n))
        } else {
            None
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok().and_then(Self::new)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn band(self) -> ClassBand {
        match self.0 {
            1..=5 => ClassBand::Primary,
            6..=8 => ClassBand::Middle,
            _ => ClassBand::Senior,
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (Self::MIN..=Self::MAX).map(Self)
    }

    pub fn sections(self) -> &'static [&'static str] {
        self.band().sections()
    }

    pub fn offers_section(self, section: &str) -> bool {
        self.sections().contains(&section)
    }
}

impl fmt::Display for ClassNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassBand {
    Primary,
    Middle,
    Senior,
}

impl ClassBand {
    pub const ALL: [Self; 3] = [Self::Primary, Self::Middle, Self::Senior];

    pub const fn classes(self) -> RangeInclusive<u8> {
        match self {
            Self::Primary => 1..=5,
            Self::Middle => 6..=8,
            Self::Senior => 9..=10,
        }
    }

    pub fn sections(self) -> &'static [&'static str] {
        match self {
            Self::Primary | Self::Middle => &SECTIONS[..3],
            Self::Senior => &SECTIONS,
        }
    }

    pub const fn subjects(self) -> &'static [&'static str] {
        match self {
            Self::Primary => &["Hindi", "English", "Maths", "EVS", "Computer"],
            Self::Middle => &["Hindi", "English", "Maths", "Computer", "S.St", "Science"],
            Self::Senior => &["Hindi", "English", "Maths", "S.St", "Science", "AI"],
        }
    }

    fn overlaps(self, lowest: u8, highest: u8) -> bool {
        let classes = self.classes();
        lowest <= *classes.end() && highest >= *classes.start()
    }
}

fn parse_selection<S: AsRef<str>>(selected: &[S]) -> impl Iterator<Item = ClassNumber> + '_ {
    selected.iter().filter_map(|s| ClassNumber::parse(s.as_ref()))
}

///sorted union of the sections offered by each selected class
pub fn available_sections<S: AsRef<str>>(selected: &[S]) -> Vec<&'static str> {
    let mut sections: Vec<&'static str> = parse_selection(selected)
        .flat_map(|class| class.sections().iter().copied())
        .collect();
    sections.sort_unstable();
    sections.dedup();
    sections
}

///sorted union of the subjects for every band overlapping `[min(selected), max(selected)]`
pub fn available_subjects<S: AsRef<str>>(selected: &[S]) -> Vec<&'static str> {
    let (lowest, highest) = parse_selection(selected).fold((None, None), |(lo, hi), class| {
        (
            Some(lo.map_or(class, |lo: ClassNumber| lo.min(class))),
            Some(hi.map_or(class, |hi: ClassNumber| hi.max(class))),
        )
    });
    let (Some(lowest), Some(highest)) = (lowest, highest) else {
        return vec![];
    };

    let mut subjects: Vec<&'static str> = ClassBand::ALL
        .into_iter()
        .filter(|band| band.overlaps(lowest.get(), highest.get()))
        .flat_map(|band| band.subjects().iter().copied())
        .collect();
    subjects.sort_unstable();
    subjects.dedup();
    subjects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_numbers_outside_one_to_ten_are_rejected() {
        assert_eq!(ClassNumber::parse("0"), None);
        assert_eq!(ClassNumber::parse("11"), None);
        assert_eq!(ClassNumber::parse("IX"), None);
        assert_eq!(ClassNumber::parse(" 7 ").map(ClassNumber::get), Some(7));
        assert_eq!(ClassNumber::all().count(), 10);
    }

    #[test]
    fn bands_cover_expected_classes() {
        assert_eq!(ClassNumber::parse("5").unwrap().band(), ClassBand::Primary);
        assert_eq!(ClassNumber::parse("6").unwrap().band(), ClassBand::Middle);
        assert_eq!(ClassNumber::parse("8").unwrap().band(), ClassBand::Middle);
        assert_eq!(ClassNumber::parse("9").unwrap().band(), ClassBand::Senior);
    }

    #[test]
    fn neev_only_offered_to_senior_classes() {
        assert_eq!(available_sections(&["3"]), vec!["A", "B", "C"]);
        assert_eq!(available_sections(&["8"]), vec!["A", "B", "C"]);
        assert_eq!(available_sections(&["10"]), vec!["A", "B", "C", "NEEV"]);
        assert_eq!(available_sections(&["2", "9"]), vec!["A", "B", "C", "NEEV"]);

        let nine = ClassNumber::parse("9").unwrap();
        assert!(nine.offers_section("NEEV"));
        assert!(!ClassNumber::parse("4").unwrap().offers_section("NEEV"));
    }

    #[test]
    fn empty_or_garbage_selection_offers_nothing() {
        let empty: [&str; 0] = [];
        assert!(available_sections(&empty).is_empty());
        assert!(available_subjects(&empty).is_empty());
        assert!(available_sections(&["", "abc", "42"]).is_empty());
        assert!(available_subjects(&["", "abc", "42"]).is_empty());
    }

    #[test]
    fn subjects_for_single_bands() {
        assert_eq!(
            available_subjects(&["1"]),
            vec!["Computer", "EVS", "English", "Hindi", "Maths"]
        );
        assert_eq!(
            available_subjects(&["7"]),
            vec!["Computer", "English", "Hindi", "Maths", "S.St", "Science"]
        );
        assert_eq!(
            available_subjects(&["9", "10"]),
            vec!["AI", "English", "Hindi", "Maths", "S.St", "Science"]
        );
    }

    #[test]
    fn subject_span_includes_bands_between_the_selected_classes() {
        //selecting 3 and 9 spans the middle band as well
        let subjects = available_subjects(&["3", "9"]);
        assert_eq!(
            subjects,
            vec![
                "AI", "Computer", "EVS", "English", "Hindi", "Maths", "S.St", "Science"
            ]
        );
    }

    #[test]
    fn duplicate_classes_do_not_duplicate_choices() {
        assert_eq!(available_sections(&["4", "4", "5"]), vec!["A", "B", "C"]);
        let subjects = available_subjects(&["4", "4"]);
        let mut deduped = subjects.clone();
        deduped.dedup();
        assert_eq!(subjects, deduped);
    }
}
