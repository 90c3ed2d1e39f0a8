//! The selection state machine, as plain data plus pure transitions.
//!
//! Country -> Province -> City -> Selected. Nothing here performs I/O;
//! [`super::resolver::ResolverSession`] decides when data is loaded.

use super::types::{Country, LocationError, Selection, Step};
use serde::Serialize;

/// A user (or hint) choice for the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Country(Country),
    Province(String),
    City(String),
}

impl Choice {
    pub fn step(&self) -> Step {
        match self {
            Self::Country(_) => Step::Country,
            Self::Province(_) => Step::Province,
            Self::City(_) => Step::City,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub step: Step,
    pub selected_country: Option<Country>,
    pub selected_province: Option<String>,
    pub selected_city: Option<String>,
    pub search_query: String,
    pub last_error: Option<String>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self {
            step: Step::Country,
            selected_country: None,
            selected_province: None,
            selected_city: None,
            search_query: String::new(),
            last_error: None,
        }
    }

    /// Apply a choice for the current step and move forward.
    ///
    /// Returns the final [`Selection`] when a city is chosen.
    pub fn advance(&mut self, choice: Choice) -> Result<Option<Selection>, LocationError> {
        if choice.step() != self.step {
            return Err(LocationError::InvalidTransition { step: choice.step() });
        }
        match choice {
            Choice::Country(country) => {
                self.selected_country = Some(country);
                self.selected_province = None;
                self.selected_city = None;
                self.clear_transient();
                self.step = Step::Province;
                Ok(None)
            }
            Choice::Province(province) => {
                self.selected_province = Some(province);
                self.selected_city = None;
                self.clear_transient();
                self.step = Step::City;
                Ok(None)
            }
            Choice::City(city) => {
                let (Some(country), Some(province)) = (&self.selected_country, &self.selected_province) else {
                    return Err(LocationError::InvalidTransition { step: Step::City });
                };
                let selection = Selection {
                    city: city.clone(),
                    country: country.name.clone(),
                    province: province.clone(),
                };
                self.selected_city = Some(city);
                self.clear_transient();
                self.step = Step::Selected;
                Ok(Some(selection))
            }
        }
    }

    /// Rewind one step, clearing the selections that no longer apply.
    /// Returns `false` when there is nowhere to go back to.
    pub fn back(&mut self) -> bool {
        match self.step {
            Step::Country | Step::Selected => return false,
            Step::Province => {
                self.selected_country = None;
                self.selected_province = None;
                self.step = Step::Country;
            }
            Step::City => {
                self.selected_province = None;
                self.step = Step::Province;
            }
        }
        self.selected_city = None;
        self.clear_transient();
        true
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search_query = query.into();
    }

    pub fn set_error(&mut self, message: Option<String>) {
        self.last_error = message;
    }

    /// Back to a fresh `Country` step.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn selection(&self) -> Option<Selection> {
        if self.step != Step::Selected {
            return None;
        }
        Some(Selection {
            city: self.selected_city.clone()?,
            country: self.selected_country.as_ref()?.name.clone(),
            province: self.selected_province.clone()?,
        })
    }

    fn clear_transient(&mut self) {
        self.search_query.clear();
        self.last_error = None;
    }
}
