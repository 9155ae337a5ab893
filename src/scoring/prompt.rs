// src/scoring/prompt.rs
use crate::ingest::{clean_html, truncate_chars};

const MAX_BODY_CHARS: usize = 1_200;

/// Newsroom framing for the relevance prompt.
#[derive(Debug, Clone)]
pub struct PromptContext {
    /// Our own outlet, e.g. "Telemarksavisa".
    pub newsroom: String,
    /// Coverage area, e.g. "Telemark".
    pub region: String,
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            newsroom: "Telemarksavisa".to_string(),
            region: "Telemark".to_string(),
        }
    }
}

/// Build the scoring prompt. The answer format must stay in sync with
/// [`super::parse::MarkerParser`].
pub fn build_prompt(ctx: &PromptContext, title: &str, body: &str, keyword: &str, year: i32) -> String {
    let title = clean_html(title);
    let body = truncate_chars(&clean_html(body), MAX_BODY_CHARS);
    let region = &ctx.region;
    format!(
        "Du er nyhetssjef i {newsroom}. Vurder hvor relevant saken er for lesere i {region}.\n\
         Søkeord funnet: '{keyword}'.\n\
         Tittel: {title}\n\
         Ingress: {body}\n\
         \n\
         SKALA (0-100):\n\
         - 0-39: støy, irrelevant eller utdatert.\n\
         - 40-69: svak lokal tilknytning.\n\
         - 70-89: tydelig lokal sak for {region}.\n\
         - 90-100: stor hendelse eller breaking i {region}.\n\
         \n\
         GI 0 POENG HVIS:\n\
         - saken handler om et tidligere år enn {year} og ikke er ny.\n\
         - teksten er en forside, oversikt eller seksjonsside uten konkret sak.\n\
         - søkeordet '{keyword}' viser til noe annet enn stedet/aktøren i {region} (samme navn, annen betydning).\n\
         \n\
         Begrunnelse: maks 10 ord.\n\
         \n\
         Format:\n\
         Score: [tall 0-100]\n\
         Begrunnelse: [kort tekst]",
        newsroom = ctx.newsroom,
    )
}
