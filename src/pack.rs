use std::{fmt, str::FromStr};

/// One of the three gift packs on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pack {
    A,
    B,
    C,
}

impl Pack {
    pub const ALL: [Pack; 3] = [Pack::A, Pack::B, Pack::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pack::A => "A",
            Pack::B => "B",
            Pack::C => "C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pack::A => "Pacco A",
            Pack::B => "Pacco B",
            Pack::C => "Pacco C",
        }
    }

    pub fn subtitle(&self) -> &'static str {
        match self {
            Pack::A => "Un po' di neve, un po' di stile",
            Pack::B => "Per quando la montagna chiama",
            Pack::C => "Per celebrare come si deve",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Pack::A => "Pacco A - Modalità: neve ⛷️",
            Pack::B => "Pacco B - Modalità: vetta 🏔️",
            Pack::C => "Pacco C - Modalità: missione compiuta 🩺",
        }
    }

    pub fn line(&self) -> &'static str {
        match self {
            Pack::A => "Congratulazioni per la specializzazione: Dottoressa Ginecologa 💙",
            Pack::B => "Ufficialmente ginecologa. Adesso sì che possiamo dirlo 😄",
            Pack::C => "Specializzazione sbloccata. Livello: leggenda.",
        }
    }

    /// Accepts the stored identifier as well as the button label.
    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        Pack::ALL
            .into_iter()
            .find(|pack| text == pack.label() || text == pack.as_str())
    }
}

impl fmt::Display for Pack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPack(pub String);

impl FromStr for Pack {
    type Err = UnknownPack;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Pack::A),
            "B" => Ok(Pack::B),
            "C" => Ok(Pack::C),
            other => Err(UnknownPack(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackChoice {
    #[default]
    Unchosen,
    Chosen(Pack),
}

impl PackChoice {
    /// Picks `pack` unless something was already picked. Returns the pack
    /// that ends up chosen.
    pub fn choose(&mut self, pack: Pack) -> Pack {
        match *self {
            PackChoice::Chosen(existing) => existing,
            PackChoice::Unchosen => {
                *self = PackChoice::Chosen(pack);
                pack
            }
        }
    }

    pub fn reset(&mut self) {
        *self = PackChoice::Unchosen;
    }

    pub fn selected(&self) -> Option<Pack> {
        match self {
            PackChoice::Chosen(pack) => Some(*pack),
            PackChoice::Unchosen => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_sticks() {
        let mut choice = PackChoice::default();
        assert_eq!(choice.choose(Pack::B), Pack::B);
        assert_eq!(choice.choose(Pack::A), Pack::B);
        assert_eq!(choice, PackChoice::Chosen(Pack::B));
    }

    #[test]
    fn reset_allows_a_new_choice() {
        let mut choice = PackChoice::Chosen(Pack::C);
        choice.reset();
        assert_eq!(choice.selected(), None);
        assert_eq!(choice.choose(Pack::A), Pack::A);
    }

    #[test]
    fn parsing() {
        assert_eq!("C".parse::<Pack>(), Ok(Pack::C));
        assert!("c".parse::<Pack>().is_err());
        assert!("".parse::<Pack>().is_err());
        assert_eq!(Pack::from_label("Pacco B"), Some(Pack::B));
        assert_eq!(Pack::from_label(" A "), Some(Pack::A));
        assert_eq!(Pack::from_label("Pacco D"), None);
    }
}
