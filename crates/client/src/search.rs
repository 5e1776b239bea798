//! Matchmaking search lifecycle.

use anochat_shared::{CriteriaError, MatchedUser, SearchCriteria, SearchParams, SearchStats};

/// Lifecycle of one matchmaking request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
    Matched(MatchedUser),
}

/// Search/match state machine.
///
/// Pure state: the session controller emits the corresponding wire commands
/// only after a transition here is accepted, which is what keeps duplicate
/// requests and stale matched events off the wire.
#[derive(Debug, Default)]
pub struct SearchState {
    phase: SearchPhase,
    stats: Option<SearchStats>,
}

impl SearchState {
    pub fn phase(&self) -> &SearchPhase {
        &self.phase
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.phase, SearchPhase::Searching)
    }

    /// Latest live statistics, if any arrived. Best-effort side channel;
    /// never gates a transition.
    pub fn stats(&self) -> Option<&SearchStats> {
        self.stats.as_ref()
    }

    /// Accept a start request. Returns `false` while already searching: the
    /// duplicate must not register a second search with the server.
    pub fn begin(&mut self) -> bool {
        if self.is_searching() {
            return false;
        }
        self.phase = SearchPhase::Searching;
        true
    }

    /// Accept a cancel request; only meaningful while searching.
    pub fn cancel(&mut self) -> bool {
        if !self.is_searching() {
            return false;
        }
        self.phase = SearchPhase::Idle;
        self.stats = None;
        true
    }

    /// Accept a matched event. A match arriving with no search in flight
    /// (cancelled, expired, or a duplicate delivery) is ignored.
    pub fn matched(&mut self, user: MatchedUser) -> Option<MatchedUser> {
        if !self.is_searching() {
            return None;
        }
        self.phase = SearchPhase::Matched(user.clone());
        Some(user)
    }

    /// The server gave up on the search.
    pub fn expired(&mut self) -> bool {
        if !self.is_searching() {
            return false;
        }
        self.phase = SearchPhase::Idle;
        true
    }

    /// Return to idle, e.g. once a matched chat is torn down.
    pub fn reset(&mut self) {
        self.phase = SearchPhase::Idle;
    }

    pub fn update_stats(&mut self, stats: SearchStats) {
        self.stats = Some(stats);
    }
}

/// Map validated form parameters onto the wire criteria.
///
/// The wire dialect differs from the form: a desired gender of `any`
/// becomes a one-element array marker, and coordinates are attached only
/// when the opt-in flag is set and a fix is actually present.
pub fn normalize_criteria(params: &SearchParams) -> Result<SearchCriteria, CriteriaError> {
    params.validate()?;
    let location = if params.use_location {
        params.location
    } else {
        None
    };
    Ok(SearchCriteria {
        gender: params.my_gender,
        age: params.my_age,
        desired_gender: vec![params.target_gender],
        desired_age_min: params.target_age_min,
        desired_age_max: params.target_age_max,
        use_geolocation: params.use_location,
        location,
        max_distance: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anochat_shared::{Gender, Location};

    fn matched_user() -> MatchedUser {
        MatchedUser {
            telegram_id: "555".to_string(),
            gender: Gender::Female,
            age: 23,
            chat_id: "c1".to_string(),
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            my_gender: Gender::Male,
            my_age: 25,
            target_gender: Gender::Female,
            target_age_min: 20,
            target_age_max: 30,
            use_location: false,
            location: None,
        }
    }

    #[test]
    fn duplicate_begin_is_rejected() {
        let mut state = SearchState::default();
        assert!(state.begin());
        assert!(!state.begin());
        assert!(state.is_searching());
    }

    #[test]
    fn cancel_from_idle_is_a_no_op() {
        let mut state = SearchState::default();
        assert!(!state.cancel());
        assert_eq!(*state.phase(), SearchPhase::Idle);
    }

    #[test]
    fn cancel_clears_cached_stats() {
        let mut state = SearchState::default();
        state.begin();
        state.update_stats(serde_json::from_str(
            r#"{"t":1,"m":1,"f":0,"online":{"t":2,"m":1,"f":1},
                "avgSearchTime":{"t":10,"m":10,"f":10,"matches24h":5}}"#,
        )
        .expect("stats"));
        assert!(state.stats().is_some());
        assert!(state.cancel());
        assert!(state.stats().is_none());
    }

    #[test]
    fn matched_while_idle_is_ignored() {
        let mut state = SearchState::default();
        assert_eq!(state.matched(matched_user()), None);
        assert_eq!(*state.phase(), SearchPhase::Idle);
    }

    #[test]
    fn matched_while_searching_transitions() {
        let mut state = SearchState::default();
        state.begin();
        let accepted = state.matched(matched_user());
        assert_eq!(accepted, Some(matched_user()));
        assert_eq!(*state.phase(), SearchPhase::Matched(matched_user()));

        // A replayed matched event after the transition is ignored too.
        assert_eq!(state.matched(matched_user()), None);
    }

    #[test]
    fn expired_only_applies_while_searching() {
        let mut state = SearchState::default();
        assert!(!state.expired());
        state.begin();
        assert!(state.expired());
        assert_eq!(*state.phase(), SearchPhase::Idle);
    }

    #[test]
    fn normalization_maps_form_fields_to_wire_names() {
        let criteria = normalize_criteria(&params()).expect("valid params");
        assert_eq!(criteria.gender, Gender::Male);
        assert_eq!(criteria.age, 25);
        assert_eq!(criteria.desired_gender, vec![Gender::Female]);
        assert_eq!(criteria.desired_age_min, 20);
        assert_eq!(criteria.desired_age_max, 30);
        assert!(!criteria.use_geolocation);
        assert_eq!(criteria.location, None);
    }

    #[test]
    fn desired_any_becomes_an_array_marker() {
        let mut p = params();
        p.target_gender = Gender::Any;
        let criteria = normalize_criteria(&p).expect("valid params");
        assert_eq!(criteria.desired_gender, vec![Gender::Any]);
    }

    #[test]
    fn location_requires_both_flag_and_fix() {
        let fix = Location {
            latitude: 52.5,
            longitude: 13.4,
        };

        // Flag set, fix present: included.
        let mut p = params();
        p.use_location = true;
        p.location = Some(fix);
        let criteria = normalize_criteria(&p).expect("valid params");
        assert_eq!(criteria.location, Some(fix));
        assert!(criteria.use_geolocation);

        // Fix present but flag unset: dropped.
        let mut p = params();
        p.location = Some(fix);
        let criteria = normalize_criteria(&p).expect("valid params");
        assert_eq!(criteria.location, None);
    }

    #[test]
    fn invalid_params_never_normalize() {
        let mut p = params();
        p.my_age = 17;
        assert!(normalize_criteria(&p).is_err());

        let mut p = params();
        p.my_gender = Gender::Any;
        assert_eq!(normalize_criteria(&p), Err(CriteriaError::OwnGenderAny));
    }
}
