//! Static course catalog: four modules of five daily lessons.

use serde::Serialize;

/// Total number of lessons in the course; the upper bound for lesson numbers.
pub const TOTAL_LESSONS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lesson {
    pub day: u32,
    pub title: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Module {
    pub id: u32,
    pub name: &'static str,
    /// Share of the whole course completed once this module is done.
    pub course_percentage: u32,
    pub lessons: &'static [Lesson],
}

const fn lesson(day: u32, title: &'static str) -> Lesson {
    Lesson { day, title }
}

pub static MODULES: [Module; 4] = [
    Module {
        id: 1,
        name: "FUNDAMENTOS",
        course_percentage: 25,
        lessons: &[
            lesson(1, "O Básico das Criptos"),
            lesson(2, "Como o Dinheiro se Move"),
            lesson(3, "Mercado Futuro Explicado"),
            lesson(4, "Spot vs Futuro"),
            lesson(5, "Seu Plano Financeiro"),
        ],
    },
    Module {
        id: 2,
        name: "ANÁLISE",
        course_percentage: 50,
        lessons: &[
            lesson(6, "A Matemática do Trader"),
            lesson(7, "Dominando o Vector"),
            lesson(8, "Os Indicadores que Importam"),
            lesson(9, "Trabalhando com Ranges"),
            lesson(10, "Gradiente Linear"),
        ],
    },
    Module {
        id: 3,
        name: "PRÁTICA",
        course_percentage: 75,
        lessons: &[
            lesson(11, "Nossa Estratégia"),
            lesson(12, "Conhecendo a Bitget"),
            lesson(13, "Vector na Prática"),
            lesson(14, "Seu Maior Inimigo: Você Mesmo"),
            lesson(15, "Simulando suas Primeiras Operações"),
        ],
    },
    Module {
        id: 4,
        name: "INDO PRO REAL",
        course_percentage: 100,
        lessons: &[
            lesson(16, "Hora da Verdade"),
            lesson(17, "Colocando Dinheiro na Corretora"),
            lesson(18, "Acompanhamento e Metas"),
            lesson(19, "Consultoria Permanente"),
            lesson(20, "Liberdade Financeira"),
        ],
    },
];

pub fn modules() -> &'static [Module] {
    &MODULES
}

/// Every lesson with the id of the module it belongs to, in course order.
pub fn lessons() -> impl Iterator<Item = (u32, &'static Lesson)> {
    MODULES
        .iter()
        .flat_map(|module| module.lessons.iter().map(move |l| (module.id, l)))
}

pub fn lesson_by_day(day: u32) -> Option<&'static Lesson> {
    lessons().map(|(_, l)| l).find(|l| l.day == day)
}

pub fn is_valid_lesson(day: u32) -> bool {
    (1..=TOTAL_LESSONS).contains(&day)
}

/// Rounded percentage of a module's lessons found in `completed`.
///
/// Unknown modules report 0.
pub fn module_progress(completed: &[u32], module_id: u32) -> u32 {
    let Some(module) = MODULES.iter().find(|m| m.id == module_id) else {
        return 0;
    };
    let done = module
        .lessons
        .iter()
        .filter(|l| completed.contains(&l.day))
        .count();
    rounded_percentage(done, module.lessons.len())
}

/// Rounded percentage of the whole course found in `completed`.
pub fn total_progress(completed: &[u32]) -> u32 {
    let done = lessons().filter(|(_, l)| completed.contains(&l.day)).count();
    rounded_percentage(done, TOTAL_LESSONS as usize)
}

fn rounded_percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}
