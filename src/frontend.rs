use crate::certificate::CertificateDescriptor;
use crate::modal::{LoadFallback, ModalAction, ModalError, ModalState};
use gloo_net::http::Request;
use serde::Deserialize;
use std::rc::Rc;
use wasm_bindgen::{closure::Closure, JsCast};
use wasm_bindgen_futures::spawn_local;
use web_sys::{window, Document, HtmlElement, KeyboardEvent};
use yew::prelude::*;

const MOUNT_POINT_ID: &str = "app";
const CERTIFICATES_ENDPOINT: &str = "/api/certificates";

impl Reducible for ModalState {
    type Action = ModalAction;

    fn reduce(self: Rc<Self>, action: Self::Action) -> Rc<Self> {
        let mut next = (*self).clone();
        if let Err(err) = next.apply(action) {
            log::warn!("{err}");
        }

        if next == *self {
            self
        } else {
            Rc::new(next)
        }
    }
}

#[derive(Clone, PartialEq)]
enum Catalog {
    Loading,
    Loaded(Rc<Vec<CertificateDescriptor>>),
    Unavailable,
}

#[derive(Deserialize)]
struct ApiCertificatesResponse {
    ok: bool,
    #[serde(default)]
    certificates: Vec<CertificateDescriptor>,
}

async fn fetch_certificates() -> Option<Vec<CertificateDescriptor>> {
    let response = Request::get(CERTIFICATES_ENDPOINT).send().await.ok()?;
    let payload = response.json::<ApiCertificatesResponse>().await.ok()?;

    if !payload.ok {
        return None;
    }

    Some(payload.certificates)
}

fn document() -> Option<Document> {
    window()?.document()
}

// Restores the body's own overflow value when dropped.
struct ScrollLock {
    body: HtmlElement,
    previous_overflow: String,
}

impl ScrollLock {
    fn engage() -> Option<Self> {
        let Some(body) = document().and_then(|d| d.body()) else {
            log::warn!("{}; page scroll lock disabled", ModalError::MissingUiElement("body"));
            return None;
        };

        let style = body.style();
        let previous_overflow = style.get_property_value("overflow").unwrap_or_default();
        if style.set_property("overflow", "hidden").is_err() {
            log::warn!("could not lock page scroll");
            return None;
        }

        Some(Self {
            body,
            previous_overflow,
        })
    }
}

impl Drop for ScrollLock {
    fn drop(&mut self) {
        if self
            .body
            .style()
            .set_property("overflow", &self.previous_overflow)
            .is_err()
        {
            log::warn!("could not restore page scroll");
        }
    }
}

fn open_in_new_view(url: &str) -> bool {
    let opened = window().map(|w| w.open_with_url_and_target(url, "_blank"));
    let succeeded = matches!(opened, Some(Ok(Some(_))));
    if !succeeded {
        log::warn!("could not open {url} in a new view");
    }
    succeeded
}

struct KeyListener {
    document: Document,
    callback: Closure<dyn FnMut(KeyboardEvent)>,
}

impl KeyListener {
    fn install(dispatcher: UseReducerDispatcher<ModalState>) -> Option<Self> {
        let Some(document) = document() else {
            log::warn!("{}; keyboard shortcuts disabled", ModalError::MissingUiElement("document"));
            return None;
        };

        let callback = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            if let Some(action) = ModalAction::from_key(&event.key()) {
                event.prevent_default();
                dispatcher.dispatch(action);
            }
        });

        if document
            .add_event_listener_with_callback("keydown", callback.as_ref().unchecked_ref())
            .is_err()
        {
            log::warn!("could not register keyboard shortcuts");
            return None;
        }

        Some(Self { document, callback })
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        let _ = self
            .document
            .remove_event_listener_with_callback("keydown", self.callback.as_ref().unchecked_ref());
    }
}

#[derive(Properties, PartialEq)]
struct CertificateCardProps {
    certificate: CertificateDescriptor,
    on_open: Callback<CertificateDescriptor>,
}

#[function_component(CertificateCard)]
fn certificate_card(props: &CertificateCardProps) -> Html {
    let onclick = {
        let certificate = props.certificate.clone();
        let on_open = props.on_open.clone();
        Callback::from(move |_: MouseEvent| on_open.emit(certificate.clone()))
    };

    html! {
        <li>
            <button class="cert-card" type="button" onclick={onclick}>
                <span class="cert-card-title">{props.certificate.display_title()}</span>
                <span class="cert-card-issuer muted">{props.certificate.display_issuer()}</span>
            </button>
        </li>
    }
}

#[derive(Properties, PartialEq)]
struct CertificateModalProps {
    state: UseReducerHandle<ModalState>,
}

#[function_component(CertificateModal)]
fn certificate_modal(props: &CertificateModalProps) -> Html {
    let view = props.state.view();

    let send = |action: ModalAction| {
        let dispatcher = props.state.dispatcher();
        Callback::from(move |_: MouseEvent| dispatcher.dispatch(action.clone()))
    };

    let on_image_error = {
        let dispatcher = props.state.dispatcher();
        let source_url = view.image_src.clone();
        Callback::from(move |_: Event| {
            if let Some(source_url) = source_url.clone() {
                dispatcher.dispatch(ModalAction::LoadFailed {
                    source_url,
                    new_view_opened: false,
                });
            }
        })
    };

    let on_document_error = {
        let state = props.state.clone();
        let source_url = view.download.as_ref().map(|link| link.href.clone());
        Callback::from(move |_: Event| {
            let Some(source_url) = source_url.clone() else {
                return;
            };
            let new_view_opened = match state.load_failure_plan(&source_url) {
                Some(LoadFallback::OpenInNewView(url)) => open_in_new_view(&url),
                _ => false,
            };
            state.dispatch(ModalAction::LoadFailed {
                source_url,
                new_view_opened,
            });
        })
    };

    let image_style = view
        .transform
        .as_ref()
        .map(|transform| AttrValue::from(format!("transform: {transform};")));
    let (download_href, download_name) = view
        .download
        .as_ref()
        .map(|link| {
            (
                Some(AttrValue::from(link.href.clone())),
                Some(AttrValue::from(link.filename.clone())),
            )
        })
        .unwrap_or_default();

    html! {
        <div
            id="certModal"
            class={classes!("cert-modal", view.active.then_some("active"))}
            aria-hidden={(!view.active).to_string()}
        >
            <div class="cert-modal-overlay" onclick={send(ModalAction::Close)}></div>
            <div class="cert-modal-content" role="dialog" aria-modal="true" aria-labelledby="cert-modal-title">
                <button class="cert-modal-close" type="button" aria-label="Close certificate" onclick={send(ModalAction::Close)}>
                    {"×"}
                </button>
                <div class="cert-controls" hidden={!view.controls_visible}>
                    <button class="cert-rotate-btn" type="button" title="Rotate (R)" onclick={send(ModalAction::Rotate)}>{"⟳"}</button>
                    <button class="cert-zoom-out-btn" type="button" title="Zoom out (-)" onclick={send(ModalAction::ZoomOut)}>{"−"}</button>
                    <span class="cert-zoom-level">{format!("{}%", view.zoom_percent)}</span>
                    <button class="cert-zoom-in-btn" type="button" title="Zoom in (+)" onclick={send(ModalAction::ZoomIn)}>{"+"}</button>
                    <button class="cert-reset-btn" type="button" title="Reset view (0)" onclick={send(ModalAction::ResetView)}>{"Reset"}</button>
                </div>
                <div class="cert-viewport">
                    <img
                        class="cert-image"
                        src={view.image_src.clone().map(AttrValue::from)}
                        alt={view.title.clone()}
                        style={image_style}
                        hidden={!view.image_visible}
                        onerror={on_image_error}
                    />
                    <p class="cert-load-error" hidden={!view.image_broken}>
                        {"This certificate could not be loaded."}
                    </p>
                    if view.document_visible {
                        <object
                            key={view.document_src.clone()}
                            class="cert-pdf-viewer"
                            data={view.document_src.clone()}
                            type="application/pdf"
                            aria-label={view.title.clone()}
                            onerror={on_document_error}
                        ></object>
                    }
                    if let Some(fallback_href) = view.fallback_href.clone() {
                        <p class="cert-load-error">
                            {"This certificate could not be displayed here. "}
                            <a href={fallback_href} target="_blank" rel="noopener noreferrer">
                                {"Open it in a new tab"}
                            </a>
                        </p>
                    }
                </div>
                <div class="cert-modal-info">
                    <h3 id="cert-modal-title" class="cert-modal-title">{view.title.clone()}</h3>
                    <p class="cert-modal-issuer">{view.issuer.clone()}</p>
                    <p class="cert-modal-desc">{view.description.clone()}</p>
                    <a class="cert-download-btn" href={download_href} download={download_name}>
                        {"Download"}
                    </a>
                </div>
            </div>
        </div>
    }
}

#[function_component(App)]
fn app() -> Html {
    let modal = use_reducer(ModalState::default);
    let catalog = use_state(|| Catalog::Loading);

    {
        let catalog = catalog.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                match fetch_certificates().await {
                    Some(certificates) => catalog.set(Catalog::Loaded(Rc::new(certificates))),
                    None => {
                        log::warn!("certificate catalog unavailable from {CERTIFICATES_ENDPOINT}");
                        catalog.set(Catalog::Unavailable);
                    }
                }
            });
            || ()
        });
    }

    let active = modal.is_open();

    use_effect_with(active, |active| {
        let lock = if *active { ScrollLock::engage() } else { None };
        move || drop(lock)
    });

    {
        let dispatcher = modal.dispatcher();
        use_effect_with(active, move |active| {
            let listener = if *active {
                KeyListener::install(dispatcher)
            } else {
                None
            };
            move || drop(listener)
        });
    }

    let on_open = {
        let dispatcher = modal.dispatcher();
        Callback::from(move |certificate: CertificateDescriptor| {
            dispatcher.dispatch(ModalAction::Open(certificate));
        })
    };

    let gallery = match &*catalog {
        Catalog::Loading => html! { <p class="muted">{"Loading certificates…"}</p> },
        Catalog::Unavailable => html! { <p class="muted">{"Certificates are unavailable right now."}</p> },
        Catalog::Loaded(certificates) if certificates.is_empty() => {
            html! { <p class="muted">{"No certificates yet."}</p> }
        }
        Catalog::Loaded(certificates) => html! {
            <ul class="cert-grid">
                { for certificates.iter().enumerate().map(|(index, certificate)| html! {
                    <CertificateCard
                        key={format!("{index}-{}", certificate.source_url)}
                        certificate={certificate.clone()}
                        on_open={on_open.clone()}
                    />
                }) }
            </ul>
        },
    };

    html! {
        <>
            <main id="content">
                <section aria-labelledby="certificates-heading" class="section-block">
                    <h2 id="certificates-heading">{"Certificates"}</h2>
                    {gallery}
                </section>
            </main>
            <CertificateModal state={modal} />
        </>
    }
}

pub fn run() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());

    let Some(root) = document().and_then(|d| d.get_element_by_id(MOUNT_POINT_ID)) else {
        log::error!(
            "{}; certificate gallery not started",
            ModalError::MissingUiElement("#app")
        );
        return;
    };

    yew::Renderer::<App>::with_root(root).render();
}
