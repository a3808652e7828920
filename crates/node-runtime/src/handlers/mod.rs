//! # Handlers
//!
//! The survey and event kinds this node answers, by wire name.

pub mod events;
pub mod surveys;

pub use events::{ValueEnteringEvent, ValueMetadataUpdateEvent};
pub use surveys::{
    HistorySurvey, LastValueSurvey, MetadataSurvey, StaticTagsSurvey, ValueUriSurvey, ValuesMetadataSurvey,
};

pub const SURVEY_VALUE_URI: &str = "SurveyValueUri";
pub const SURVEY_LAST_VALUE: &str = "SurveyLastValue";
pub const SURVEY_VALUE_STATIC_TAGS: &str = "SurveyValueStaticTags";
pub const SURVEY_VALUE_METADATA: &str = "SurveyValueMetadata";
pub const SURVEY_VALUES_METADATA: &str = "SurveyValuesMetadata";
pub const SURVEY_VALUE_HISTORY: &str = "SurveyValueHistory";

/// Kept as `IsacValueEnteringEvent` on the wire for interop with existing nodes.
pub const EVENT_VALUE_ENTERING: &str = "IsacValueEnteringEvent";
pub const EVENT_VALUE_METADATA_UPDATE: &str = "ValueMetadataUpdateEvent";
