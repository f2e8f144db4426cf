pub mod banners;
pub mod collector;
pub mod file_store;
pub mod leads;

pub use banners::ReqwestBannerClient;
pub use collector::ReqwestCollector;
pub use file_store::FileStore;
pub use leads::ReqwestLeadClient;
