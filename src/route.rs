/// Which page a visitor lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Quiz,
    GiftPack,
}

const GIFT_PACK_FRAGMENT: &str = "anna-specializzazione";

impl Route {
    /// Picks the page from a URL fragment or a `/start` deep-link payload.
    pub fn from_fragment(fragment: &str) -> Self {
        if fragment.contains(GIFT_PACK_FRAGMENT) {
            Route::GiftPack
        } else {
            Route::Quiz
        }
    }
}
