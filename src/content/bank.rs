//! Built-in Question Bank
//!
//! Picture questions: the prompt is a city photo URL, the options are the
//! pictured city plus three other cities from the same category.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::content::{ProviderError, QuestionProvider, QuestionRequest};
use crate::core::rng::{derive_round_seed, DeterministicRng};
use crate::game::round::{CityCategory, Question, OPTION_COUNT};

/// Base URL of the bundled city pictures.
pub const PICTURE_BASE_URL: &str = "https://images.quiz-arena.example/cities";

/// A city that can be asked about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CityEntry {
    /// City name, used as answer and option text
    pub name: String,
    /// Picture shown as the prompt
    pub picture_url: String,
}

impl CityEntry {
    /// Entry with a picture under [`PICTURE_BASE_URL`].
    pub fn bundled(name: &str) -> Self {
        let slug: String = name
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");
        Self {
            name: name.to_string(),
            picture_url: format!("{PICTURE_BASE_URL}/{slug}.jpg"),
        }
    }
}

const LANDMARKS: &[&str] = &[
    "Paris", "Rome", "Agra", "Sydney", "Rio de Janeiro", "Cairo", "Beijing", "New York",
];
const CAPITALS: &[&str] = &[
    "Berlin", "Tokyo", "Ottawa", "Canberra", "Nairobi", "Lima", "Madrid", "Seoul",
];
const EUROPE: &[&str] = &[
    "Zurich", "Vienna", "Prague", "Lisbon", "Amsterdam", "Budapest", "Oslo", "Dublin",
];
const ASIA: &[&str] = &[
    "Bangkok", "Singapore", "Hanoi", "Mumbai", "Kyoto", "Shanghai", "Istanbul", "Dubai",
];
const AMERICAS: &[&str] = &[
    "Chicago", "Toronto", "Mexico City", "Buenos Aires", "Havana", "Bogota", "San Francisco", "Santiago",
];
const AFRICA: &[&str] = &[
    "Cape Town", "Marrakesh", "Lagos", "Accra", "Dakar", "Addis Ababa", "Tunis", "Zanzibar City",
];
const OCEANIA: &[&str] = &[
    "Auckland", "Melbourne", "Wellington", "Perth", "Brisbane", "Suva", "Hobart", "Christchurch",
];

/// In-process question provider over a fixed set of cities.
#[derive(Clone, Debug, Default)]
pub struct QuestionBank {
    cities: BTreeMap<CityCategory, Vec<CityEntry>>,
    seed: u64,
}

impl QuestionBank {
    /// Create an empty bank.
    pub fn new(seed: u64) -> Self {
        Self {
            cities: BTreeMap::new(),
            seed,
        }
    }

    /// Create a bank with the bundled cities for every category.
    pub fn with_builtin(seed: u64) -> Self {
        let mut bank = Self::new(seed);
        for category in CityCategory::ALL {
            let names = match category {
                CityCategory::Landmarks => LANDMARKS,
                CityCategory::Capitals => CAPITALS,
                CityCategory::Europe => EUROPE,
                CityCategory::Asia => ASIA,
                CityCategory::Americas => AMERICAS,
                CityCategory::Africa => AFRICA,
                CityCategory::Oceania => OCEANIA,
            };
            for name in names {
                bank.add_city(category, CityEntry::bundled(name));
            }
        }
        bank
    }

    /// Add a city. Returns false if the category already has a city of that name.
    pub fn add_city(&mut self, category: CityCategory, entry: CityEntry) -> bool {
        let entries = self.cities.entry(category).or_default();
        if entries.iter().any(|e| e.name == entry.name) {
            return false;
        }
        entries.push(entry);
        true
    }

    /// Number of cities in a category.
    pub fn city_count(&self, category: CityCategory) -> usize {
        self.cities.get(&category).map_or(0, Vec::len)
    }

    /// Draw the question for one round of one game.
    ///
    /// The same bank seed, game and round always draw the same question.
    pub fn draw(&self, category: CityCategory, request: QuestionRequest) -> Result<Question, ProviderError> {
        let entries = self
            .cities
            .get(&category)
            .filter(|e| e.len() >= OPTION_COUNT)
            .ok_or(ProviderError::Exhausted(category))?;

        let mut rng = DeterministicRng::new(derive_round_seed(
            request.game_id.as_bytes(),
            request.round,
            self.seed,
        ));

        let mut picks: Vec<usize> = (0..entries.len()).collect();
        rng.shuffle(&mut picks);
        let answer = &entries[picks[0]];

        let mut options: [String; OPTION_COUNT] = Default::default();
        for (slot, idx) in options.iter_mut().zip(&picks) {
            *slot = entries[*idx].name.clone();
        }
        rng.shuffle(&mut options);

        Ok(Question {
            prompt: answer.picture_url.clone(),
            options,
            correct_answer: answer.name.clone(),
        })
    }
}

#[async_trait]
impl QuestionProvider for QuestionBank {
    async fn next_question(
        &self,
        category: CityCategory,
        request: QuestionRequest,
    ) -> Result<Question, ProviderError> {
        self.draw(category, request)
    }
}
