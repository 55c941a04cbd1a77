pub mod civil;
pub mod domain;
pub mod ports;

pub use civil::{CivilDate, CivilTime, CivilTimeError};
pub use domain::{
    AiSigns, BirthLocation, ChatMessage, ChatRole, FocusArea, Gender, MoonInfo, PlaceCandidate,
    Profile, ZodiacSystem,
};
pub use ports::{
    EphemerisProtocolError, EphemerisService, GeocodingService, GuidanceService, GuidanceStream,
    PortError, PortResult, ProfileStore, SignLookupService,
};
