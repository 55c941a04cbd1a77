pub mod chat_llm;
pub mod ephemeris;
pub mod geocoding;
pub mod sign_llm;
pub mod store;

pub use chat_llm::OpenAiGuidanceAdapter;
pub use ephemeris::SwissEphemerisMcpAdapter;
pub use geocoding::OpenMeteoGeocodingAdapter;
pub use sign_llm::OpenAiSignLookupAdapter;
pub use store::JsonFileProfileStore;
