//! Built-in question catalogue.
//!
//! Identifiers are derived from the question text so seeding the same catalogue
//! twice yields the same rows.

use uuid::Uuid;

use crate::dao::models::{QuestionEntity, QuestionTranslation, RoundType};

const CATALOGUE_NAMESPACE: Uuid = Uuid::from_u128(0x5f1b_b0c4_2a3e_4d6f_9a61_7e0c_83d2_41aa);

/// One group: the first entry is the question normal players usually get.
struct GroupSeed {
    round_type: RoundType,
    questions: &'static [[(&'static str, &'static str); 2]],
}

const GROUPS: &[GroupSeed] = &[
    GroupSeed {
        round_type: RoundType::FreeForm,
        questions: &[
            [
                ("en-GB", "What is the best thing to eat for breakfast?"),
                ("fr-FR", "Quelle est la meilleure chose à manger au petit-déjeuner ?"),
            ],
            [
                ("en-GB", "What is the worst thing to eat before bed?"),
                ("fr-FR", "Quelle est la pire chose à manger avant de dormir ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::FreeForm,
        questions: &[
            [
                ("en-GB", "Where would you go on your dream holiday?"),
                ("fr-FR", "Où partirais-tu pour tes vacances de rêve ?"),
            ],
            [
                ("en-GB", "Where would you never want to be stranded?"),
                ("fr-FR", "Où ne voudrais-tu jamais être coincé ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::FreeForm,
        questions: &[
            [
                ("en-GB", "What superpower would you choose?"),
                ("fr-FR", "Quel super-pouvoir choisirais-tu ?"),
            ],
            [
                ("en-GB", "What everyday chore would you automate first?"),
                ("fr-FR", "Quelle corvée automatiserais-tu en premier ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::FreeForm,
        questions: &[
            [
                ("en-GB", "How many cups of tea is too many in a day?"),
                ("fr-FR", "Combien de tasses de thé par jour, c'est trop ?"),
            ],
            [
                ("en-GB", "How many hours of sleep do you need?"),
                ("fr-FR", "De combien d'heures de sommeil as-tu besoin ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MultipleChoice,
        questions: &[
            [
                ("en-GB", "Pineapple belongs on pizza."),
                ("fr-FR", "L'ananas a sa place sur une pizza."),
            ],
            [
                ("en-GB", "Cereal should be eaten with a fork."),
                ("fr-FR", "Les céréales se mangent avec une fourchette."),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MultipleChoice,
        questions: &[
            [
                ("en-GB", "Cats make better pets than dogs."),
                ("fr-FR", "Les chats sont de meilleurs compagnons que les chiens."),
            ],
            [
                ("en-GB", "Goldfish make better pets than dogs."),
                ("fr-FR", "Les poissons rouges sont de meilleurs compagnons que les chiens."),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MultipleChoice,
        questions: &[
            [
                ("en-GB", "Mornings are the best part of the day."),
                ("fr-FR", "Le matin est le meilleur moment de la journée."),
            ],
            [
                ("en-GB", "Mondays are the best day of the week."),
                ("fr-FR", "Le lundi est le meilleur jour de la semaine."),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MostLikely,
        questions: &[
            [
                ("en-GB", "Who is most likely to become famous?"),
                ("fr-FR", "Qui est le plus susceptible de devenir célèbre ?"),
            ],
            [
                ("en-GB", "Who is most likely to get lost in their own town?"),
                ("fr-FR", "Qui est le plus susceptible de se perdre dans sa propre ville ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MostLikely,
        questions: &[
            [
                ("en-GB", "Who is most likely to win a cooking contest?"),
                ("fr-FR", "Qui est le plus susceptible de gagner un concours de cuisine ?"),
            ],
            [
                ("en-GB", "Who is most likely to burn toast?"),
                ("fr-FR", "Qui est le plus susceptible de brûler du pain grillé ?"),
            ],
        ],
    },
    GroupSeed {
        round_type: RoundType::MostLikely,
        questions: &[
            [
                ("en-GB", "Who is most likely to run a marathon?"),
                ("fr-FR", "Qui est le plus susceptible de courir un marathon ?"),
            ],
            [
                ("en-GB", "Who is most likely to take a nap at a party?"),
                ("fr-FR", "Qui est le plus susceptible de faire la sieste pendant une fête ?"),
            ],
        ],
    },
];

/// Questions shipped with the server for `game_name`, all enabled.
pub fn default_catalogue(game_name: &str) -> Vec<QuestionEntity> {
    GROUPS
        .iter()
        .flat_map(|group| {
            let first = group.questions[0][0].1;
            let group_id = Uuid::new_v5(
                &CATALOGUE_NAMESPACE,
                format!("{game_name}/group/{first}").as_bytes(),
            );
            group.questions.iter().map(move |translations| {
                let key = translations[0].1;
                QuestionEntity {
                    id: Uuid::new_v5(
                        &CATALOGUE_NAMESPACE,
                        format!("{game_name}/question/{key}").as_bytes(),
                    ),
                    game_name: game_name.to_owned(),
                    round_type: group.round_type,
                    group_id,
                    enabled: true,
                    translations: translations
                        .iter()
                        .map(|(locale, text)| QuestionTranslation {
                            locale: (*locale).to_owned(),
                            text: (*text).to_owned(),
                        })
                        .collect(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_round_type_has_pairs() {
        let catalogue = default_catalogue("fibbing_it");
        for round_type in [
            RoundType::FreeForm,
            RoundType::MultipleChoice,
            RoundType::MostLikely,
        ] {
            let count = catalogue
                .iter()
                .filter(|q| q.round_type == round_type)
                .count();
            assert!(count >= 2, "{round_type} has {count} questions");
        }
    }

    #[test]
    fn identifiers_are_stable() {
        assert_eq!(default_catalogue("fibbing_it"), default_catalogue("fibbing_it"));
        let a = default_catalogue("fibbing_it");
        let mut ids: Vec<_> = a.iter().map(|q| q.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), a.len());
    }
}
