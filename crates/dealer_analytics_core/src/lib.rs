pub mod consent;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod session;
pub mod tracker;

pub use consent::{ConsentDecision, ConsentState, ThirdPartyScript};
pub use domain::{
    AnalyticsEvent, BannerEnvelope, CampaignBanner, ConsentSettings, ContactRequest, Countdown,
    EventPayload, EventType, HeroSlide, LeadReceipt, LeadSubmission, PageContext, SessionData,
    UtmParams,
};
pub use memory::{MemoryCookieJar, MemoryStore};
pub use ports::{
    BannerService, CollectorTransport, CookieJar, KeyValueStore, LeadService, PortError,
    PortResult,
};
pub use session::SessionManager;
pub use tracker::{
    EventScope, FlushOutcome, TrackOutcome, Tracker, TrackerConfig, TrackerIdentity, TrackerStats,
};
