use crate::certificate::{document_viewer_url, CertificateDescriptor, ContentKind};
use thiserror::Error;

const ROTATION_STEP_DEGREES: u16 = 90;
const FULL_TURN_DEGREES: u16 = 360;
const ZOOM_STEPS_PER_UNIT: u8 = 4;
const ZOOM_MIN_STEPS: u8 = 2;
const ZOOM_MAX_STEPS: u8 = 12;
const ZOOM_DEFAULT_STEPS: u8 = ZOOM_STEPS_PER_UNIT;

pub const BLANK_VIEWER_SRC: &str = "about:blank";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModalError {
    #[error("certificate has no source URL; modal left closed")]
    MissingSource,
    #[error("failed to load {kind} certificate from {source_url}")]
    ResourceLoadFailure { kind: ContentKind, source_url: String },
    #[error("missing UI element `{0}`")]
    MissingUiElement(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModalAction {
    Open(CertificateDescriptor),
    Close,
    Rotate,
    ResetView,
    ZoomIn,
    ZoomOut,
    LoadFailed {
        source_url: String,
        new_view_opened: bool,
    },
}

impl ModalAction {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "Escape" => Some(Self::Close),
            "r" | "R" => Some(Self::Rotate),
            "0" => Some(Self::ResetView),
            "+" | "=" => Some(Self::ZoomIn),
            "-" => Some(Self::ZoomOut),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadFallback {
    ShowBrokenImage,
    OpenInNewView(String),
}

#[derive(Clone, Debug, PartialEq)]
struct OpenCertificate {
    descriptor: CertificateDescriptor,
    kind: ContentKind,
    load_failed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadLink {
    pub href: String,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModalView {
    pub active: bool,
    pub image_visible: bool,
    pub image_src: Option<String>,
    pub document_visible: bool,
    pub document_src: String,
    pub controls_visible: bool,
    pub title: String,
    pub issuer: String,
    pub description: String,
    pub download: Option<DownloadLink>,
    pub transform: Option<String>,
    pub image_broken: bool,
    pub document_broken: bool,
    pub fallback_href: Option<String>,
    pub zoom_percent: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModalState {
    current: Option<OpenCertificate>,
    rotation_degrees: u16,
    // Quarter steps, so the factor is always an exact multiple of 0.25.
    zoom_steps: u8,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            current: None,
            rotation_degrees: 0,
            zoom_steps: ZOOM_DEFAULT_STEPS,
        }
    }
}

impl ModalState {
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        self.current.as_ref().map(|current| current.kind)
    }

    pub fn rotation_degrees(&self) -> u16 {
        self.rotation_degrees
    }

    pub fn zoom_factor(&self) -> f64 {
        f64::from(self.zoom_steps) / f64::from(ZOOM_STEPS_PER_UNIT)
    }

    pub fn apply(&mut self, action: ModalAction) -> Result<(), ModalError> {
        match action {
            ModalAction::Open(descriptor) => self.open(descriptor).map(|_| ()),
            ModalAction::Close => {
                self.close();
                Ok(())
            }
            ModalAction::Rotate => {
                self.rotate();
                Ok(())
            }
            ModalAction::ResetView => {
                self.reset_view();
                Ok(())
            }
            ModalAction::ZoomIn => {
                self.zoom_in();
                Ok(())
            }
            ModalAction::ZoomOut => {
                self.zoom_out();
                Ok(())
            }
            ModalAction::LoadFailed {
                source_url,
                new_view_opened,
            } => match self.load_failed(&source_url, new_view_opened) {
                Some(_) => Err(ModalError::ResourceLoadFailure {
                    kind: ContentKind::classify(&source_url),
                    source_url,
                }),
                None => Ok(()),
            },
        }
    }

    pub fn open(&mut self, descriptor: CertificateDescriptor) -> Result<ContentKind, ModalError> {
        if !descriptor.has_source() {
            return Err(ModalError::MissingSource);
        }

        let kind = descriptor.content_kind();
        log::debug!("opening {kind} certificate {}", descriptor.source_url);

        self.current = Some(OpenCertificate {
            descriptor,
            kind,
            load_failed: false,
        });
        self.reset_transform();
        Ok(kind)
    }

    pub fn close(&mut self) {
        if self.current.take().is_some() {
            log::debug!("certificate modal closed");
        }
        self.reset_transform();
    }

    pub fn rotate(&mut self) {
        if self.transform_enabled() {
            self.rotation_degrees = (self.rotation_degrees + ROTATION_STEP_DEGREES) % FULL_TURN_DEGREES;
        }
    }

    pub fn reset_view(&mut self) {
        if self.is_open() {
            self.reset_transform();
        }
    }

    pub fn zoom_in(&mut self) {
        if self.transform_enabled() {
            self.zoom_steps = (self.zoom_steps + 1).min(ZOOM_MAX_STEPS);
        }
    }

    pub fn zoom_out(&mut self) {
        if self.transform_enabled() {
            self.zoom_steps = self.zoom_steps.saturating_sub(1).max(ZOOM_MIN_STEPS);
        }
    }

    pub fn load_failure_plan(&self, source_url: &str) -> Option<LoadFallback> {
        let current = self.current.as_ref()?;
        if current.descriptor.source_url != source_url {
            return None;
        }

        Some(match current.kind {
            ContentKind::Image => LoadFallback::ShowBrokenImage,
            ContentKind::Document => LoadFallback::OpenInNewView(source_url.to_string()),
        })
    }

    // A document that could not be shown in a new view stays open with a link to it.
    pub fn load_failed(&mut self, source_url: &str, new_view_opened: bool) -> Option<LoadFallback> {
        let plan = self.load_failure_plan(source_url)?;

        match plan {
            LoadFallback::OpenInNewView(_) if new_view_opened => self.close(),
            _ => {
                if let Some(current) = self.current.as_mut() {
                    current.load_failed = true;
                }
            }
        }

        Some(plan)
    }

    pub fn transform(&self) -> Option<String> {
        self.transform_enabled().then(|| {
            format!(
                "rotate({}deg) scale({})",
                self.rotation_degrees,
                self.zoom_factor()
            )
        })
    }

    pub fn view(&self) -> ModalView {
        let zoom_percent = u16::from(self.zoom_steps) * (100 / u16::from(ZOOM_STEPS_PER_UNIT));

        let Some(current) = self.current.as_ref() else {
            return ModalView {
                active: false,
                image_visible: false,
                image_src: None,
                document_visible: false,
                document_src: BLANK_VIEWER_SRC.to_string(),
                controls_visible: false,
                title: String::new(),
                issuer: String::new(),
                description: String::new(),
                download: None,
                transform: None,
                image_broken: false,
                document_broken: false,
                fallback_href: None,
                zoom_percent,
            };
        };

        let descriptor = &current.descriptor;
        let is_image = current.kind == ContentKind::Image;

        ModalView {
            active: true,
            image_visible: is_image,
            image_src: is_image.then(|| descriptor.source_url.clone()),
            document_visible: !is_image,
            document_src: if is_image {
                BLANK_VIEWER_SRC.to_string()
            } else {
                document_viewer_url(&descriptor.source_url)
            },
            controls_visible: current.kind.supports_transform(),
            title: descriptor.display_title().to_string(),
            issuer: descriptor.display_issuer().to_string(),
            description: descriptor.display_description().to_string(),
            download: Some(DownloadLink {
                href: descriptor.source_url.clone(),
                filename: descriptor.download_filename(),
            }),
            transform: self.transform(),
            image_broken: is_image && current.load_failed,
            document_broken: !is_image && current.load_failed,
            fallback_href: (!is_image && current.load_failed).then(|| descriptor.source_url.clone()),
            zoom_percent,
        }
    }

    fn transform_enabled(&self) -> bool {
        self.content_kind()
            .is_some_and(ContentKind::supports_transform)
    }

    fn reset_transform(&mut self) {
        self.rotation_degrees = 0;
        self.zoom_steps = ZOOM_DEFAULT_STEPS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(title: &str) -> CertificateDescriptor {
        CertificateDescriptor::new("cert1.png").with_title(title)
    }

    fn document(title: &str) -> CertificateDescriptor {
        CertificateDescriptor::new("cert2.pdf").with_title(title)
    }

    fn open_state(descriptor: CertificateDescriptor) -> ModalState {
        let mut state = ModalState::default();
        state.open(descriptor).expect("descriptor has a source");
        state
    }

    #[test]
    fn rotation_cycles_through_quarter_turns() {
        let mut state = open_state(image("AWS Cert"));

        for count in 1..=12u16 {
            state.rotate();
            assert_eq!(state.rotation_degrees(), (90 * count) % 360);
            assert!([0, 90, 180, 270].contains(&state.rotation_degrees()));
        }
    }

    #[test]
    fn zoom_stays_on_quarter_steps_within_bounds() {
        let mut state = open_state(image("AWS Cert"));
        let pattern = [true, true, false, true, true, true, true, true, true, true, true, false];

        for _ in 0..3 {
            for zoom_in in pattern {
                if zoom_in {
                    state.zoom_in();
                } else {
                    state.zoom_out();
                }
                let zoom = state.zoom_factor();
                assert!((0.5..=3.0).contains(&zoom));
                assert_eq!(((zoom - 1.0) / 0.25).fract(), 0.0);
            }
        }

        for _ in 0..20 {
            state.zoom_out();
        }
        assert_eq!(state.zoom_factor(), 0.5);
    }

    #[test]
    fn reset_view_restores_defaults() {
        let mut state = open_state(image("AWS Cert"));
        state.rotate();
        state.rotate();
        state.zoom_in();
        state.zoom_out();
        state.zoom_out();

        state.reset_view();

        assert_eq!(state.rotation_degrees(), 0);
        assert_eq!(state.zoom_factor(), 1.0);
    }

    #[test]
    fn open_then_close_resets_view_and_clears_viewer() {
        let mut state = open_state(document("Security+"));
        assert_ne!(state.view().document_src, BLANK_VIEWER_SRC);

        state.close();

        let view = state.view();
        assert!(!view.active);
        assert_eq!(view.document_src, BLANK_VIEWER_SRC);
        assert_eq!(state.rotation_degrees(), 0);
        assert_eq!(state.zoom_factor(), 1.0);
    }

    #[test]
    fn closing_twice_matches_closing_once() {
        let mut state = open_state(image("AWS Cert"));
        state.rotate();
        state.close();
        let once = state.clone();

        state.close();

        assert_eq!(state, once);
        assert_eq!(state.view(), once.view());
    }

    #[test]
    fn opening_while_open_replaces_certificate_and_view() {
        let mut state = open_state(image("AWS Cert"));
        state.rotate();
        state.zoom_in();

        state.open(document("Security+")).expect("descriptor has a source");

        assert_eq!(state.content_kind(), Some(ContentKind::Document));
        assert_eq!(state.rotation_degrees(), 0);
        assert_eq!(state.zoom_factor(), 1.0);
        assert_eq!(state.view().title, "Security+");
    }

    #[test]
    fn image_certificate_shows_image_and_controls() {
        let view = open_state(image("AWS Cert")).view();

        assert!(view.active);
        assert!(view.image_visible);
        assert_eq!(view.image_src.as_deref(), Some("cert1.png"));
        assert!(!view.document_visible);
        assert_eq!(view.document_src, BLANK_VIEWER_SRC);
        assert!(view.controls_visible);
        assert_eq!(
            view.download,
            Some(DownloadLink {
                href: "cert1.png".to_string(),
                filename: "AWS_Cert.pdf".to_string(),
            })
        );
    }

    #[test]
    fn document_certificate_shows_viewer_without_controls() {
        let view = open_state(document("Security+")).view();

        assert!(view.document_visible);
        assert_eq!(view.document_src, "cert2.pdf#toolbar=0&navpanes=0&scrollbar=1");
        assert!(!view.image_visible);
        assert_eq!(view.image_src, None);
        assert!(!view.controls_visible);
        assert_eq!(view.transform, None);
    }

    #[test]
    fn exactly_one_content_element_is_visible_while_open() {
        for descriptor in [image("AWS Cert"), document("Security+")] {
            let view = open_state(descriptor).view();
            assert!(view.image_visible ^ view.document_visible);
        }
    }

    #[test]
    fn four_rotations_return_to_identity_transform() {
        let mut state = open_state(image("AWS Cert"));

        for _ in 0..4 {
            state.rotate();
        }

        assert_eq!(state.rotation_degrees(), 0);
        assert_eq!(state.transform().as_deref(), Some("rotate(0deg) scale(1)"));
    }

    #[test]
    fn transform_uses_shortest_number_form() {
        let mut state = open_state(image("AWS Cert"));
        state.rotate();
        state.zoom_in();

        assert_eq!(state.transform().as_deref(), Some("rotate(90deg) scale(1.25)"));
        assert_eq!(state.view().zoom_percent, 125);
    }

    #[test]
    fn zoom_in_clamps_at_three() {
        let mut state = open_state(image("AWS Cert"));

        for _ in 0..10 {
            state.zoom_in();
        }

        assert_eq!(state.zoom_factor(), 3.0);
        assert_eq!(state.transform().as_deref(), Some("rotate(0deg) scale(3)"));
    }

    #[test]
    fn open_without_source_leaves_state_untouched() {
        let mut state = ModalState::default();
        let before = state.clone();

        let result = state.open(CertificateDescriptor::new("").with_title("Empty"));

        assert_eq!(result, Err(ModalError::MissingSource));
        assert_eq!(state, before);
        assert!(!state.is_open());
    }

    #[test]
    fn escape_key_closes_and_clears_viewer() {
        let mut state = open_state(document("Security+"));
        let action = ModalAction::from_key("Escape").expect("escape is bound");

        state.apply(action).expect("close cannot fail");

        assert!(!state.is_open());
        assert_eq!(state.view().document_src, BLANK_VIEWER_SRC);
    }

    #[test]
    fn keyboard_shortcuts_map_to_button_actions() {
        assert_eq!(ModalAction::from_key("r"), Some(ModalAction::Rotate));
        assert_eq!(ModalAction::from_key("R"), Some(ModalAction::Rotate));
        assert_eq!(ModalAction::from_key("0"), Some(ModalAction::ResetView));
        assert_eq!(ModalAction::from_key("+"), Some(ModalAction::ZoomIn));
        assert_eq!(ModalAction::from_key("="), Some(ModalAction::ZoomIn));
        assert_eq!(ModalAction::from_key("-"), Some(ModalAction::ZoomOut));
        assert_eq!(ModalAction::from_key("Enter"), None);
        assert_eq!(ModalAction::from_key("x"), None);
    }

    #[test]
    fn view_actions_are_noops_while_closed() {
        let mut state = ModalState::default();
        let before = state.clone();

        for action in [
            ModalAction::Rotate,
            ModalAction::ZoomIn,
            ModalAction::ZoomOut,
            ModalAction::ResetView,
        ] {
            state.apply(action).expect("view actions cannot fail");
        }

        assert_eq!(state, before);
    }

    #[test]
    fn rotate_and_zoom_do_not_touch_documents() {
        let mut state = open_state(document("Security+"));
        let before = state.view();

        state.rotate();
        state.zoom_in();
        state.zoom_out();

        assert_eq!(state.rotation_degrees(), 0);
        assert_eq!(state.zoom_factor(), 1.0);
        assert_eq!(state.view(), before);
    }

    #[test]
    fn image_load_failure_keeps_modal_open_with_broken_indicator() {
        let mut state = open_state(image("AWS Cert"));

        let result = state.apply(ModalAction::LoadFailed {
            source_url: "cert1.png".to_string(),
            new_view_opened: false,
        });

        assert!(matches!(
            result,
            Err(ModalError::ResourceLoadFailure { kind: ContentKind::Image, .. })
        ));
        assert!(state.is_open());
        assert!(state.view().image_broken);
    }

    #[test]
    fn document_load_failure_opens_new_view_and_closes() {
        let mut state = open_state(document("Security+"));

        let plan = state.load_failed("cert2.pdf", true);

        assert_eq!(plan, Some(LoadFallback::OpenInNewView("cert2.pdf".to_string())));
        assert!(!state.is_open());
        assert_eq!(state.view().document_src, BLANK_VIEWER_SRC);
    }

    #[test]
    fn blocked_new_view_keeps_document_open_with_fallback_link() {
        let mut state = open_state(document("Security+"));
        let plan = state.load_failure_plan("cert2.pdf");
        assert_eq!(plan, Some(LoadFallback::OpenInNewView("cert2.pdf".to_string())));

        let result = state.apply(ModalAction::LoadFailed {
            source_url: "cert2.pdf".to_string(),
            new_view_opened: false,
        });

        assert!(matches!(
            result,
            Err(ModalError::ResourceLoadFailure { kind: ContentKind::Document, .. })
        ));
        let view = state.view();
        assert!(view.active);
        assert!(view.document_broken);
        assert!(!view.image_broken);
        assert_eq!(view.fallback_href.as_deref(), Some("cert2.pdf"));
    }

    #[test]
    fn stale_load_failure_is_ignored() {
        let mut state = open_state(image("AWS Cert"));
        state.open(document("Security+")).expect("descriptor has a source");
        let before = state.clone();

        let result = state.apply(ModalAction::LoadFailed {
            source_url: "cert1.png".to_string(),
            new_view_opened: true,
        });

        assert_eq!(result, Ok(()));
        assert!(state.is_open());
        assert_eq!(state, before);
    }

    #[test]
    fn reopening_clears_broken_indicator() {
        let mut state = open_state(image("AWS Cert"));
        state.load_failed("cert1.png", false);

        state.open(image("AWS Cert")).expect("descriptor has a source");

        assert!(!state.view().image_broken);
    }
}
