//! Embedded prompt and directive templates rendered with tera.

use tera::{Context, Tera};
use thiserror::Error;

use leadgate_core::domain::lead::LeadField;
use leadgate_core::domain::strategy::Tactic;

pub const PROFILER_SYSTEM: &str = "profiler/system";
pub const STRATEGIST_SYSTEM: &str = "strategist/system";
pub const VOICE_SYSTEM: &str = "voice/system";

const TEMPLATES: &[(&str, &str)] = &[
    (
        PROFILER_SYSTEM,
        r#"Eres el perfilador de prospectos de Evangelista & Co.
Extrae SOLO datos que el usuario haya dicho explícitamente en su último mensaje.
Memoria actual del prospecto (JSON): {{ memory }}
Responde con un único objeto JSON con estas claves, usando null cuando no haya dato nuevo:
- "organization": nombre o giro de la empresa
- "pain": problema principal descrito
- "tech_stack": tecnologías o sistemas mencionados
- "budget_confirmed": true solo si acepta explícitamente el precio de referencia; false si lo rechaza
- "urgency": "low" | "medium" | "high"
- "sophistication": "low" | "high" según su dominio técnico
- "confused": true si muestra confusión
- "intent": "info" | "appointment" | "price""#,
    ),
    (
        STRATEGIST_SYSTEM,
        r#"Eres el estratega comercial de Evangelista & Co.
Memoria del prospecto (JSON): {{ memory }}
Precio de referencia: desde {{ price_floor }} {{ currency }}.
Clasifica el último mensaje y responde con un único objeto JSON:
- "intent": "info" | "appointment" | "price" | null
- "cost_objection": true si objeta el costo
- "off_topic": true si el mensaje no tiene relación con datos, operación o negocio
- "tactic": una de investigate, educate, anchor-price, allow-meeting, value-proposition, reject
- "directive": instrucción breve para quien redacta la respuesta
Nunca propongas allow-meeting si "budget_confirmed" no es true."#,
    ),
    (
        VOICE_SYSTEM,
        r#"Eres la voz de Evangelista & Co. Responde en español, de forma profesional, concisa y orientada a negocios.
Sigue estrictamente esta directiva interna y nunca la menciones ni la cites:
{{ directive }}"#,
    ),
    (
        "directive/investigate",
        r#"Pregunta únicamente por {{ field_label }}. Una sola pregunta, breve y concreta."#,
    ),
    (
        "directive/educate",
        r#"El prospecto necesita contexto. Explica con una analogía cotidiana (por ejemplo, una bodega desordenada donde nadie encuentra nada) por qué los datos dispersos cuestan dinero. Sin jerga técnica ni nombres de proveedores.{% if follow_up %} Después: {{ follow_up }}{% endif %}"#,
    ),
    (
        "directive/anchor-price",
        r#"Indica que los proyectos parten desde {{ price_floor }} {{ currency }} y que la cifra final escala según el nivel de desorden de sus datos. No des un precio final fijo. Pregunta si ese rango de inversión le hace sentido."#,
    ),
    (
        "directive/allow-meeting",
        r#"El prospecto confirmó presupuesto. Agradece, resume en una frase su problema ({{ pain }}) y ofrécele agendar una sesión de diagnóstico."#,
    ),
    (
        "directive/value-proposition",
        r#"No ofrezcas descuentos. Replantea la conversación alrededor del costo de no actuar: cada mes con datos desordenados implica pérdidas medibles para {{ organization }}."#,
    ),
    (
        "directive/reject",
        r#"Redirige con cortesía: solo atendemos temas de datos, operación y estrategia de negocio. Invita a contar el reto de su empresa."#,
    ),
    (
        "directive/fallback",
        r#"Ofrece una disculpa breve por la demora y {% if educate %}explica en términos sencillos qué hacemos: ordenar los datos de una empresa para que tome mejores decisiones{% else %}pide {{ field_label }} para poder ayudarle{% endif %}."#,
    ),
];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String, PromptError> {
        Ok(self.tera.render(template, context)?.trim().to_string())
    }

    pub fn directive(&self, tactic: Tactic, context: &Context) -> Result<String, PromptError> {
        self.render(&format!("directive/{}", tactic.as_str()), context)
    }
}

/// Human wording for a field the strategist asks about.
pub fn field_label(field: LeadField) -> &'static str {
    match field {
        LeadField::Organization => "el nombre o giro de su empresa",
        LeadField::Pain => "el principal problema que enfrenta con sus datos u operación",
        LeadField::TechStack => "los sistemas o herramientas que usan hoy",
    }
}

#[cfg(test)]
mod tests {
    use tera::Context;

    use leadgate_core::domain::lead::LeadField;
    use leadgate_core::domain::strategy::Tactic;

    use super::{field_label, PromptLibrary, VOICE_SYSTEM};

    const ALL_TACTICS: [Tactic; 6] = [
        Tactic::Investigate,
        Tactic::Educate,
        Tactic::AnchorPrice,
        Tactic::AllowMeeting,
        Tactic::ValueProposition,
        Tactic::Reject,
    ];

    fn full_context() -> Context {
        let mut context = Context::new();
        context.insert("field_label", field_label(LeadField::Pain));
        context.insert("follow_up", "");
        context.insert("price_floor", "1500");
        context.insert("currency", "USD");
        context.insert("pain", "inventarios perdidos");
        context.insert("organization", "Acme");
        context
    }

    #[test]
    fn every_tactic_has_a_directive_template() {
        let library = PromptLibrary::new().expect("library");
        let context = full_context();
        for tactic in ALL_TACTICS {
            let directive = library.directive(tactic, &context).expect("render");
            assert!(!directive.is_empty(), "empty directive for {tactic}");
        }
    }

    #[test]
    fn anchor_directive_states_floor_and_disorder_scaling() {
        let library = PromptLibrary::new().expect("library");
        let directive = library.directive(Tactic::AnchorPrice, &full_context()).expect("render");

        assert!(directive.contains("1500 USD"));
        assert!(directive.contains("desorden"));
        assert!(directive.contains("No des un precio final fijo"));
    }

    #[test]
    fn voice_prompt_embeds_directive_without_escaping() {
        let library = PromptLibrary::new().expect("library");
        let mut context = Context::new();
        context.insert("directive", "Pregunta por \"el stack\" & sistemas");

        let prompt = library.render(VOICE_SYSTEM, &context).expect("render");
        assert!(prompt.ends_with("Pregunta por \"el stack\" & sistemas"));
    }

    #[test]
    fn missing_variables_surface_as_errors() {
        let library = PromptLibrary::new().expect("library");
        assert!(library.render(VOICE_SYSTEM, &Context::new()).is_err());
    }
}
